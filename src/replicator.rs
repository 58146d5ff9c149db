//! Replication of the storyteller's state to spectators.
//!
//! The host side builds public projections of its state: roles stay secret
//! except for travelers, and official content is referenced by id only.
//! The spectator side turns received projections into [`Mutation`]s against
//! its local copy, emitting a mutation only where a value actually differs.

use crate::protocol::{
    Command, EditionPayload, GamestatePayload, PlayerField, PlayerProjection, PlayerUpdate, SeatSlot,
};
use crate::state::{clean_role_id, Edition, GameState, Player, Role};
use crate::store::{Mutation, NominationUpdate, PlayerChange, RoleCatalog};

// ── Host side ───────────────────────────────────────────────────────

/// What spectators may see of `player`.
pub fn project_player(player: &Player) -> PlayerProjection {
    PlayerProjection {
        name: player.name.clone(),
        id: player.id.clone(),
        is_dead: player.is_dead,
        vote_token: player.vote_token,
        pronouns: player.pronouns.clone(),
        role_id: player
            .role
            .is_traveler()
            .then(|| player.role.id.clone()),
    }
}

pub fn roster(state: &GameState) -> Vec<PlayerProjection> {
    state.players.iter().map(project_player).collect()
}

/// Roster-only snapshot sent after players are added, removed or replaced.
pub fn lightweight_snapshot(state: &GameState) -> GamestatePayload {
    GamestatePayload {
        gamestate: roster(state),
        is_lightweight: true,
        ..GamestatePayload::default()
    }
}

/// Roster plus every table flag and the voting round.
pub fn full_snapshot(state: &GameState) -> GamestatePayload {
    let session = &state.session;
    let grimoire = &state.grimoire;
    let nominated = session.nomination.is_some();
    GamestatePayload {
        gamestate: roster(state),
        is_lightweight: false,
        is_night: Some(grimoire.is_night),
        is_ringing: Some(grimoire.is_ringing),
        is_rooster: Some(grimoire.is_rooster),
        timer: Some(grimoire.timer.clone()),
        is_vote_history_allowed: Some(session.is_vote_history_allowed),
        is_organ_vote_mode: Some(grimoire.is_organ_vote_mode),
        nomination: session.nomination.clone(),
        voting_speed: Some(session.voting_speed),
        locked_vote: Some(session.locked_vote),
        is_vote_in_progress: Some(session.is_vote_in_progress),
        marked_player: Some(SeatSlot(session.marked_player)),
        fabled: Some(fabled_payload(&state.fabled)),
        votes: nominated.then(|| session.votes.clone()),
    }
}

/// The edition as published: official editions by id, custom editions in
/// full with their stripped character list.
pub fn edition_payload(state: &GameState) -> EditionPayload {
    match &state.edition {
        Some(edition) if edition.is_official => EditionPayload {
            edition: Some(Edition::reference(edition.id.clone())),
            roles: None,
        },
        Some(edition) => EditionPayload {
            edition: Some(edition.clone()),
            roles: Some(state.roles.values().map(Role::stripped).collect()),
        },
        None => EditionPayload::default(),
    }
}

/// Fabled as published: custom fabled inline, catalog fabled by id.
pub fn fabled_payload(fabled: &[Role]) -> Vec<Role> {
    fabled
        .iter()
        .map(|role| {
            if role.is_custom {
                role.clone()
            } else {
                Role::reference(role.id.clone())
            }
        })
        .collect()
}

/// Edition followed by the full snapshot, addressed to `target` or to
/// everyone.
pub fn full_sync(state: &GameState, target: Option<&str>) -> Vec<Command> {
    let commands = [
        Command::Edition(edition_payload(state)),
        Command::Gamestate(Box::new(full_snapshot(state))),
    ];
    match target.filter(|target| !target.is_empty()) {
        Some(target) => commands
            .into_iter()
            .map(|command| Command::direct(target, command))
            .collect(),
        None => commands.into_iter().collect(),
    }
}

/// One `direct` envelope giving every seated participant its own character.
pub fn role_distribution(state: &GameState) -> Option<Command> {
    let recipients: std::collections::BTreeMap<String, Command> = state
        .players
        .iter()
        .enumerate()
        .filter(|(_, player)| !player.is_vacant())
        .map(|(index, player)| {
            let update = Command::Player(PlayerUpdate {
                index,
                field: PlayerField::Role(player.role.id.clone()),
            });
            (player.id.clone(), update)
        })
        .collect();
    (!recipients.is_empty()).then_some(Command::Direct(recipients))
}

// ── Spectator side ──────────────────────────────────────────────────

/// A character by id: the edition's own set first, then the catalog.
pub fn resolve_role(state: &GameState, catalog: &RoleCatalog, id: &str) -> Option<Role> {
    state
        .roles
        .get(id)
        .or_else(|| catalog.role(id))
        .cloned()
}

/// Fabled references resolved against custom then catalog fabled.
pub fn resolve_fabled(state: &GameState, catalog: &RoleCatalog, fabled: &[Role]) -> Vec<Role> {
    fabled
        .iter()
        .map(|role| {
            state
                .custom_fabled
                .get(&role.id)
                .or_else(|| catalog.fabled(&role.id))
                .cloned()
                .unwrap_or_else(|| role.clone())
        })
        .collect()
}

/// Adds or truncates players so the local roster has `len` seats.
pub fn reconcile_length(state: &GameState, roster: &[PlayerProjection]) -> Vec<Mutation> {
    let local = state.players.len();
    if local < roster.len() {
        roster
            .iter()
            .skip(local)
            .map(|projection| Mutation::AddPlayer(projection.name.clone()))
            .collect()
    } else {
        (roster.len()..local).rev().map(Mutation::RemovePlayer).collect()
    }
}

/// Per-field changes bringing each local player in line with `roster`.
///
/// Expects the lengths to be reconciled already; extra entries are skipped.
pub fn roster_changes(
    state: &GameState,
    catalog: &RoleCatalog,
    roster: &[PlayerProjection],
) -> Vec<Mutation> {
    let mut changes = Vec::new();
    for (player, projection) in state.players.iter().zip(roster) {
        let mut push = |change: PlayerChange| {
            changes.push(Mutation::UpdatePlayer {
                player: player.handle,
                change,
            });
        };
        if player.name != projection.name {
            push(PlayerChange::Name(projection.name.clone()));
        }
        if player.id != projection.id {
            push(PlayerChange::Id(projection.id.clone()));
        }
        if player.is_dead != projection.is_dead {
            push(PlayerChange::IsDead(projection.is_dead));
        }
        if player.vote_token != projection.vote_token {
            push(PlayerChange::VoteToken(projection.vote_token));
        }
        if player.pronouns != projection.pronouns {
            push(PlayerChange::Pronouns(projection.pronouns.clone()));
        }
        match projection.role_id.as_deref().filter(|id| !id.is_empty()) {
            Some(role_id) if player.role.id != role_id => {
                if let Some(role) = resolve_role(state, catalog, role_id) {
                    push(PlayerChange::Role(role));
                }
            }
            Some(_) => {}
            None if player.role.is_traveler() => push(PlayerChange::Role(Role::default())),
            None => {}
        }
    }
    changes
}

/// Table flags and the voting round of a full snapshot.
pub fn flag_changes(
    state: &GameState,
    catalog: &RoleCatalog,
    payload: &GamestatePayload,
) -> Vec<Mutation> {
    let mut changes = Vec::new();
    if let Some(timer) = &payload.timer {
        changes.push(Mutation::SetTimer(timer.clone()));
    }
    changes.push(Mutation::ToggleRinging(Some(payload.is_ringing.unwrap_or(false))));
    changes.push(Mutation::ToggleNight(Some(payload.is_night.unwrap_or(false))));
    if let Some(rooster) = payload.is_rooster {
        changes.push(Mutation::ToggleRooster(Some(rooster)));
    }
    if let Some(allowed) = payload.is_vote_history_allowed {
        changes.push(Mutation::SetVoteHistoryAllowed(allowed));
    }
    changes.push(Mutation::ToggleOrganVoteMode(Some(
        payload.is_organ_vote_mode.unwrap_or(false),
    )));
    changes.push(Mutation::SyncNomination(NominationUpdate {
        nomination: payload.nomination.clone(),
        votes: payload.votes.clone(),
        voting_speed: payload.voting_speed,
        locked_vote: payload.locked_vote,
        is_vote_in_progress: payload.is_vote_in_progress,
    }));
    changes.push(Mutation::SetMarkedPlayer(
        payload.marked_player.and_then(|slot| slot.0),
    ));
    if let Some(fabled) = &payload.fabled {
        changes.push(Mutation::SetFabled(resolve_fabled(state, catalog, fabled)));
    }
    changes
}

/// The change a `player` message asks for, if the seat exists.
pub fn player_update(
    state: &GameState,
    catalog: &RoleCatalog,
    update: &PlayerUpdate,
) -> Option<Mutation> {
    let player = state.player(update.index)?;
    let change = match &update.field {
        PlayerField::Name(name) => PlayerChange::Name(name.clone()),
        PlayerField::Id(id) => PlayerChange::Id(id.clone()),
        PlayerField::IsDead(flag) => PlayerChange::IsDead(*flag),
        PlayerField::VoteToken(flag) => PlayerChange::VoteToken(*flag),
        PlayerField::Pronouns(pronouns) => PlayerChange::Pronouns(pronouns.clone()),
        // an empty id clears a traveler; an unknown id leaves the role blank
        PlayerField::Role(id) if id.is_empty() => PlayerChange::Role(Role::default()),
        PlayerField::Role(id) => {
            PlayerChange::Role(resolve_role(state, catalog, id).unwrap_or_default())
        }
    };
    Some(Mutation::UpdatePlayer {
        player: player.handle,
        change,
    })
}

/// Changes for an `edition` message.
pub fn edition_changes(payload: &EditionPayload) -> Vec<Mutation> {
    let mut changes = Vec::new();
    if let Some(edition) = &payload.edition {
        changes.push(Mutation::SetEdition(edition.clone()));
    }
    if let Some(roles) = &payload.roles {
        changes.push(Mutation::SetCustomRoles(roles.clone()));
    }
    changes
}

/// Ids of sent characters that could not be loaded, when the loaded set
/// does not match what the storyteller sent.
pub fn missing_roles(state: &GameState, sent: &[Role]) -> Option<Vec<String>> {
    if state.roles.len() == sent.len() {
        return None;
    }
    Some(
        sent.iter()
            .filter(|role| !state.roles.contains_key(&clean_role_id(&role.id)))
            .map(|role| role.id.clone())
            .collect(),
    )
}
