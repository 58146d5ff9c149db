//! Seat claims: which participant sits where.
//!
//! Spectators only ask; the storyteller decides. A seat is bound to at most
//! one identity and an identity to at most one seat. Contended or invalid
//! claims are dropped without an answer.

use crate::state::GameState;
use crate::store::{Mutation, PlayerChange};

/// Whether a spectator should send a claim for `seat` at all. Leaving
/// (`None`) is always allowed; a seat must exist and be vacant.
pub fn can_claim(state: &GameState, seat: Option<usize>) -> bool {
    match seat {
        None => true,
        Some(seat) => state.player(seat).is_some_and(|player| player.is_vacant()),
    }
}

fn unbind(state: &GameState, seat: usize) -> Option<Mutation> {
    state.player(seat).map(|player| Mutation::UpdatePlayer {
        player: player.handle,
        change: PlayerChange::Id(String::new()),
    })
}

/// Changes the storyteller makes for a claim of `seat` by `identity`.
///
/// Returns no changes when the claim is ignored: an empty identity, a seat
/// that does not exist, or a seat bound to someone else.
pub fn arbitrate(state: &GameState, seat: Option<usize>, identity: &str) -> Vec<Mutation> {
    if identity.is_empty() {
        return Vec::new();
    }
    let target = match seat {
        Some(seat) => match state.player(seat) {
            Some(player) if player.is_vacant() || player.id == identity => Some(player),
            _ => return Vec::new(),
        },
        None => None,
    };

    let mut changes: Vec<Mutation> = state
        .players
        .iter()
        .enumerate()
        .filter(|(index, player)| player.id == identity && Some(*index) != seat)
        .filter_map(|(index, _)| unbind(state, index))
        .collect();

    if let Some(player) = target.filter(|player| player.id != identity) {
        changes.push(Mutation::UpdatePlayer {
            player: player.handle,
            change: PlayerChange::Id(identity.to_owned()),
        });
    }
    changes
}

/// Vacate every seat bound to one of `identities`.
pub fn release(state: &GameState, identities: &[String]) -> Vec<Mutation> {
    state
        .players
        .iter()
        .enumerate()
        .filter(|(_, player)| !player.is_vacant() && identities.contains(&player.id))
        .filter_map(|(index, _)| unbind(state, index))
        .collect()
}
