//! Rules of the nomination and voting round.
//!
//! Votes are counted clockwise starting after the rotation origin (the
//! nominee's seat, else the nominator's, else seat 0). Each lock step
//! freezes one more seat in that order; a player may no longer change a
//! vote once its seat is behind the lock, but the storyteller always can.

use std::time::SystemTime;

use crate::state::{GameState, Nomination, Player, SeatRef, VoteHistoryEntry};
use crate::store::HistoryLabels;

/// Position of `seat` in the counting order starting from `origin`:
/// `(seat - 1 + player_count - origin) mod player_count`.
///
/// Returns 0 for an empty roster.
pub fn rotation_index(seat: usize, player_count: usize, origin: usize) -> usize {
    if player_count == 0 {
        return 0;
    }
    let (seat, origin) = (seat % player_count, origin % player_count);
    (seat + 2 * player_count - 1 - origin) % player_count
}

/// Rotation origin of the active nomination, or seat 0.
fn origin(state: &GameState) -> usize {
    state
        .session
        .nomination
        .as_ref()
        .map_or(0, Nomination::rotation_origin)
}

/// Whether an incoming vote for `seat` may change the round.
///
/// Storyteller votes always pass. Other votes pass while
/// `rotation_index >= locked_vote - 1`.
pub fn accepts_vote(state: &GameState, seat: usize, from_host: bool) -> bool {
    if from_host {
        return true;
    }
    let index = rotation_index(seat, state.players.len(), origin(state));
    index.saturating_add(1) >= state.session.locked_vote
}

/// Seat most recently frozen by the lock: `(origin + locked_vote - 1) mod
/// player_count`.
pub fn locked_position(state: &GameState) -> Option<usize> {
    let count = state.players.len();
    if count == 0 {
        return None;
    }
    let origin = origin(state) % count;
    let steps = state.session.locked_vote % count;
    Some((origin + steps + count - 1) % count)
}

/// Votes needed to pass: half the living players, rounded up. An exile
/// counts every player, dead or alive.
pub fn majority(players: &[Player], is_exile: bool) -> usize {
    players
        .iter()
        .filter(|player| is_exile || !player.is_dead)
        .count()
        .div_ceil(2)
}

fn party_name(party: Option<&SeatRef>, players: &[Player]) -> String {
    match party {
        Some(SeatRef::Seat(seat)) => players
            .get(*seat)
            .map(|player| player.name.clone())
            .unwrap_or_default(),
        Some(SeatRef::Label(label)) => label.clone(),
        None => String::new(),
    }
}

/// The history record for the round that is about to end, if it should be
/// kept.
///
/// Nothing is recorded when no nomination is active, when the round did not
/// lock every seat (`locked_vote <= player_count`), or when a spectator is
/// not allowed to keep history. Under Organ Grinder a spectator records the
/// judgment without its voters.
pub fn history_entry(state: &GameState, labels: &HistoryLabels) -> Option<VoteHistoryEntry> {
    let session = &state.session;
    if !session.is_vote_history_allowed && session.is_spectator {
        return None;
    }
    let nomination = session.nomination.as_ref()?;
    let players = &state.players;
    if session.locked_vote <= players.len() {
        return None;
    }

    let is_exile = nomination.is_traveler_exile(players);
    let organ_grinder = state.grimoire.is_organ_vote_mode && !is_exile;

    let kind = match &nomination.special_vote {
        Some(special) if !special.kind.is_empty() => special.kind.clone(),
        _ if is_exile => labels.exile.clone(),
        _ if organ_grinder && !session.is_spectator => format!("{}*", labels.execution),
        _ => labels.execution.clone(),
    };

    let votes = if organ_grinder && session.is_spectator {
        None
    } else {
        Some(
            players
                .iter()
                .zip(&session.votes)
                .filter(|(_, vote)| **vote == Some(true))
                .map(|(player, _)| player.name.clone())
                .collect(),
        )
    };

    Some(VoteHistoryEntry {
        timestamp: SystemTime::now(),
        nominator: party_name(nomination.nominator.as_ref(), players),
        nominee: party_name(nomination.nominee.as_ref(), players),
        kind,
        majority: majority(players, is_exile),
        votes,
    })
}
