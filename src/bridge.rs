//! Outbound side of the live session: which local changes go on the wire.
//!
//! [`observe`] is called once for every mutation committed with
//! [`Origin::Local`](crate::store::Origin::Local), after it has been applied.
//! Replicas of remote changes never reach it, so a change is published by the
//! participant that made it and by no one else.

use crate::protocol::{Command, LockMessage, PlayerField, PlayerUpdate, SeatSlot, VoteMessage};
use crate::replicator;
use crate::seats;
use crate::session::{Effect, SessionRole};
use crate::state::{GameState, Identity, HOST_ADDRESS};
use crate::store::{Mutation, PlayerChange};
use crate::voting;

/// Facts about the state before a mutation that its outbound action needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Before {
    /// The player being updated was a traveler.
    pub was_traveler: bool,
}

impl Before {
    pub fn capture(mutation: &Mutation, state: &GameState) -> Self {
        let was_traveler = match mutation {
            Mutation::UpdatePlayer {
                player,
                change: PlayerChange::Role(_),
            } => state
                .seat_of(*player)
                .and_then(|seat| state.player(seat))
                .is_some_and(|player| player.role.is_traveler()),
            _ => false,
        };
        Self { was_traveler }
    }
}

/// Who is publishing, as seen by the bridge.
#[derive(Debug, Clone, Copy)]
pub struct Publisher<'a> {
    pub role: SessionRole,
    pub identity: &'a Identity,
}

impl Publisher<'_> {
    fn is_host(&self) -> bool {
        self.role == SessionRole::Host
    }
}

/// Outbound effects of a locally committed `mutation`.
pub fn observe(
    publisher: Publisher<'_>,
    mutation: &Mutation,
    before: Before,
    state: &GameState,
) -> Vec<Effect> {
    let session = &state.session;
    let host = publisher.is_host();
    let send = |command: Command| vec![Effect::Send(command)];
    let host_send = |command: Command| {
        if host {
            vec![Effect::Send(command)]
        } else {
            Vec::new()
        }
    };

    match mutation {
        Mutation::SetSessionId(_) if !session.session_id.is_empty() => {
            vec![Effect::Connect(session.session_id.clone())]
        }
        Mutation::SetSessionId(_) => {
            let mut effects = Vec::new();
            if !host && !publisher.identity.is_empty() {
                effects.push(Effect::Send(Command::direct(
                    HOST_ADDRESS,
                    Command::Bye(publisher.identity.clone()),
                )));
            }
            effects.push(Effect::Disconnect);
            effects
        }
        Mutation::ClaimSeat(seat) if !host && seats::can_claim(state, *seat) => {
            send(Command::Claim {
                seat: SeatSlot(*seat),
                identity: publisher.identity.clone(),
            })
        }
        Mutation::DistributeRoles(true) if host => replicator::role_distribution(state)
            .map(Effect::Send)
            .into_iter()
            .collect(),
        Mutation::SetNomination(_) | Mutation::SyncNomination(_) if host => {
            let nomination = session.nomination.clone();
            let fits = nomination
                .as_ref()
                .is_none_or(|n| n.fits_roster(state.players.len()));
            if !fits {
                return Vec::new();
            }
            let mut effects = Vec::new();
            if session.voting_speed > 0 {
                effects.push(Effect::Send(Command::VotingSpeed(session.voting_speed)));
            }
            effects.push(Effect::Send(Command::Nomination(nomination)));
            effects
        }
        Mutation::SetVoteInProgress(_) => host_send(Command::IsVoteInProgress(
            session.is_vote_in_progress,
        )),
        Mutation::Vote { seat, .. } => {
            let own_seat = state
                .player(*seat)
                .is_some_and(|player| !player.is_vacant() && player.id == *publisher.identity);
            if !(host || own_seat) {
                return Vec::new();
            }
            send(Command::Vote(VoteMessage {
                seat: *seat,
                vote: session.votes.get(*seat).copied().flatten(),
                from_host: host,
            }))
        }
        Mutation::LockVote(_) => {
            let vote = voting::locked_position(state)
                .and_then(|seat| session.votes.get(seat).copied())
                .flatten();
            host_send(Command::Lock(LockMessage {
                locked_vote: session.locked_vote,
                vote,
            }))
        }
        Mutation::SetVotingSpeed(speed) if *speed > 0 => host_send(Command::VotingSpeed(*speed)),
        Mutation::ClearVoteHistory => host_send(Command::ClearVoteHistory),
        Mutation::SetVoteHistoryAllowed(_) => host_send(Command::IsVoteHistoryAllowed(
            session.is_vote_history_allowed,
        )),
        Mutation::SetMarkedPlayer(_) => host_send(Command::Marked(SeatSlot(session.marked_player))),

        Mutation::ToggleNight(_) => host_send(Command::IsNight(state.grimoire.is_night)),
        Mutation::ToggleRinging(_) => host_send(Command::IsRinging(state.grimoire.is_ringing)),
        Mutation::ToggleRooster(_) => host_send(Command::IsRooster(state.grimoire.is_rooster)),
        Mutation::ToggleOrganVoteMode(_) => host_send(Command::IsOrganVoteMode(
            state.grimoire.is_organ_vote_mode,
        )),
        Mutation::SetTimer(_) => host_send(Command::SetTimer(state.grimoire.timer.clone())),
        Mutation::SetEdition(_) => host_send(Command::Edition(replicator::edition_payload(state))),
        Mutation::SetFabled(_) => host_send(Command::Fabled(replicator::fabled_payload(
            &state.fabled,
        ))),

        Mutation::SwapPlayers(from, to) => host_send(Command::Swap(*from, *to)),
        Mutation::MovePlayer(from, to) => host_send(Command::Move(*from, *to)),
        Mutation::RemovePlayer(index) => host_send(Command::Remove(*index)),
        Mutation::SetPlayers(_) | Mutation::ClearPlayers | Mutation::AddPlayer(_) => host_send(
            Command::Gamestate(Box::new(replicator::lightweight_snapshot(state))),
        ),
        Mutation::UpdatePlayer { player, change } => {
            let Some(index) = state.seat_of(*player) else {
                return Vec::new();
            };
            player_effects(publisher, state, index, change, before)
        }

        _ => Vec::new(),
    }
}

fn player_effects(
    publisher: Publisher<'_>,
    state: &GameState,
    index: usize,
    change: &PlayerChange,
    before: Before,
) -> Vec<Effect> {
    let field = match change {
        PlayerChange::Pronouns(pronouns) => {
            let own_seat = state
                .player(index)
                .is_some_and(|player| player.id == *publisher.identity);
            if !publisher.is_host() && !own_seat {
                return Vec::new();
            }
            return vec![Effect::Send(Command::Pronouns {
                seat: index,
                pronouns: pronouns.clone(),
            })];
        }
        _ if !publisher.is_host() => return Vec::new(),
        PlayerChange::Reminders(_) => return Vec::new(),
        PlayerChange::Role(role) if role.is_traveler() => PlayerField::Role(role.id.clone()),
        PlayerChange::Role(_) if before.was_traveler => PlayerField::Role(String::new()),
        PlayerChange::Role(_) => return Vec::new(),
        PlayerChange::Name(name) => PlayerField::Name(name.clone()),
        PlayerChange::Id(id) => PlayerField::Id(id.clone()),
        PlayerChange::IsDead(flag) => PlayerField::IsDead(*flag),
        PlayerChange::VoteToken(flag) => PlayerField::VoteToken(*flag),
    };
    vec![Effect::Send(Command::Player(PlayerUpdate { index, field }))]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::state::{Nomination, Player, Role, Team};
    use crate::store::{MemoryStore, RoleCatalog, Store, VoteCast};

    const ME: &str = "me";

    fn table(seated: &[&str]) -> MemoryStore {
        let mut store = MemoryStore::new(RoleCatalog::new());
        let players = seated
            .iter()
            .enumerate()
            .map(|(seat, id)| Player {
                id: (*id).to_owned(),
                ..Player::new(format!("p{seat}"))
            })
            .collect();
        store.commit(&Mutation::SetPlayers(players));
        store
    }

    /// Commits `mutation` and returns what `role` would send for it.
    fn publish(store: &mut MemoryStore, role: SessionRole, mutation: Mutation) -> Vec<Effect> {
        let before = Before::capture(&mutation, store.state());
        store.commit(&mutation);
        let identity = ME.to_owned();
        observe(
            Publisher {
                role,
                identity: &identity,
            },
            &mutation,
            before,
            store.state(),
        )
    }

    fn sent(effects: &[Effect]) -> Vec<&Command> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn spectators_do_not_publish_authoritative_state() {
        let mut store = table(&["", ""]);
        for mutation in [
            Mutation::ToggleNight(None),
            Mutation::SetMarkedPlayer(Some(1)),
            Mutation::SwapPlayers(0, 1),
            Mutation::AddPlayer("c".into()),
            Mutation::SetNomination(Some(Nomination::standard(0, 1))),
            Mutation::LockVote(None),
        ] {
            assert!(publish(&mut store, SessionRole::Spectator, mutation).is_empty());
        }
    }

    #[test]
    fn host_publishes_flags_from_resulting_state() {
        let mut store = table(&[]);
        let effects = publish(&mut store, SessionRole::Host, Mutation::ToggleNight(None));
        assert_eq!(sent(&effects), vec![&Command::IsNight(true)]);
        let effects = publish(&mut store, SessionRole::Host, Mutation::SetMarkedPlayer(None));
        assert_eq!(sent(&effects), vec![&Command::Marked(SeatSlot::EMPTY)]);
    }

    #[test]
    fn nomination_resyncs_voting_speed_first() {
        let mut store = table(&["", "", ""]);
        let effects = publish(
            &mut store,
            SessionRole::Host,
            Mutation::SetNomination(Some(Nomination::standard(0, 2))),
        );
        assert_eq!(
            sent(&effects),
            vec![
                &Command::VotingSpeed(1000),
                &Command::Nomination(Some(Nomination::standard(0, 2))),
            ]
        );
    }

    #[test]
    fn nomination_outside_roster_is_not_published() {
        let mut store = table(&["", ""]);
        let effects = publish(
            &mut store,
            SessionRole::Host,
            Mutation::SetNomination(Some(Nomination::standard(0, 5))),
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn spectator_publishes_only_own_vote() {
        let mut store = table(&["other", ME]);
        store.commit(&Mutation::SetNomination(Some(Nomination::standard(0, 1))));
        let foreign = publish(
            &mut store,
            SessionRole::Spectator,
            Mutation::Vote {
                seat: 0,
                cast: VoteCast::Toggle,
            },
        );
        assert!(foreign.is_empty());
        let own = publish(
            &mut store,
            SessionRole::Spectator,
            Mutation::Vote {
                seat: 1,
                cast: VoteCast::Toggle,
            },
        );
        assert_eq!(
            sent(&own),
            vec![&Command::Vote(VoteMessage {
                seat: 1,
                vote: Some(true),
                from_host: false,
            })]
        );
    }

    #[test]
    fn lock_carries_vote_at_locked_position() {
        let mut store = table(&["", "", ""]);
        store.commit(&Mutation::SetNomination(Some(Nomination::standard(0, 1))));
        store.commit(&Mutation::Vote {
            seat: 1,
            cast: VoteCast::Set(Some(true)),
        });
        let effects = publish(&mut store, SessionRole::Host, Mutation::LockVote(None));
        // origin 1, lock 1: position 1
        assert_eq!(
            sent(&effects),
            vec![&Command::Lock(LockMessage {
                locked_vote: 1,
                vote: Some(true),
            })]
        );
    }

    #[test]
    fn roster_edits_send_lightweight_snapshot() {
        let mut store = table(&[]);
        let effects = publish(&mut store, SessionRole::Host, Mutation::AddPlayer("Ann".into()));
        let commands = sent(&effects);
        let [Command::Gamestate(payload)] = commands.as_slice() else {
            panic!("expected one gs frame");
        };
        assert!(payload.is_lightweight);
        assert_eq!(payload.gamestate[0].name, "Ann");
    }

    #[test]
    fn role_changes_reveal_only_travelers() {
        let mut store = table(&["", ""]);
        let handle = store.state().players[0].handle;
        let traveler = Role {
            id: "beggar".into(),
            team: Some(Team::Traveler),
            ..Role::default()
        };
        let secret = Role {
            id: "imp".into(),
            team: Some(Team::Demon),
            ..Role::default()
        };

        let hidden = publish(
            &mut store,
            SessionRole::Host,
            Mutation::UpdatePlayer {
                player: handle,
                change: PlayerChange::Role(secret.clone()),
            },
        );
        assert!(hidden.is_empty());

        let revealed = publish(
            &mut store,
            SessionRole::Host,
            Mutation::UpdatePlayer {
                player: handle,
                change: PlayerChange::Role(traveler),
            },
        );
        assert_eq!(
            sent(&revealed),
            vec![&Command::Player(PlayerUpdate {
                index: 0,
                field: PlayerField::Role("beggar".into()),
            })]
        );

        let cleared = publish(
            &mut store,
            SessionRole::Host,
            Mutation::UpdatePlayer {
                player: handle,
                change: PlayerChange::Role(secret),
            },
        );
        assert_eq!(
            sent(&cleared),
            vec![&Command::Player(PlayerUpdate {
                index: 0,
                field: PlayerField::Role(String::new()),
            })]
        );
    }

    #[test]
    fn reminders_are_never_sent() {
        let mut store = table(&[""]);
        let handle = store.state().players[0].handle;
        let effects = publish(
            &mut store,
            SessionRole::Host,
            Mutation::UpdatePlayer {
                player: handle,
                change: PlayerChange::Reminders(Vec::new()),
            },
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn pronouns_from_spectator_only_for_own_seat() {
        let mut store = table(&[ME, "other"]);
        let mine = store.state().players[0].handle;
        let theirs = store.state().players[1].handle;
        let own = publish(
            &mut store,
            SessionRole::Spectator,
            Mutation::UpdatePlayer {
                player: mine,
                change: PlayerChange::Pronouns("they/them".into()),
            },
        );
        assert_eq!(sent(&own).len(), 1);
        let foreign = publish(
            &mut store,
            SessionRole::Spectator,
            Mutation::UpdatePlayer {
                player: theirs,
                change: PlayerChange::Pronouns("she/her".into()),
            },
        );
        assert!(foreign.is_empty());
    }

    #[test]
    fn leaving_as_spectator_says_bye_to_host() {
        let mut store = table(&[]);
        let effects = publish(
            &mut store,
            SessionRole::Spectator,
            Mutation::SetSessionId(String::new()),
        );
        assert_eq!(effects.len(), 2);
        assert!(matches!(
            &effects[0],
            Effect::Send(Command::Direct(recipients))
                if recipients.get(HOST_ADDRESS) == Some(&Command::Bye(ME.to_owned()))
        ));
        assert!(matches!(effects[1], Effect::Disconnect));

        let joined = publish(
            &mut store,
            SessionRole::Host,
            Mutation::SetSessionId("Room 1".into()),
        );
        assert!(matches!(&joined[..], [Effect::Connect(channel)] if channel == "room1"));
    }

    #[test]
    fn claim_is_sent_only_for_vacant_seat() {
        let mut store = table(&["", "taken"]);
        let ok = publish(&mut store, SessionRole::Spectator, Mutation::ClaimSeat(Some(0)));
        assert_eq!(
            sent(&ok),
            vec![&Command::Claim {
                seat: SeatSlot::seat(0),
                identity: ME.to_owned(),
            }]
        );
        let taken = publish(&mut store, SessionRole::Spectator, Mutation::ClaimSeat(Some(1)));
        assert!(taken.is_empty());
    }
}
