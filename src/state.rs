//! Game state shared between the storyteller and the players.
//!
//! [`GameState`] is the complete local view of a session. On the host it is
//! the source of truth; on a spectator it is a projection assembled from
//! replicated messages. It is only ever mutated through a
//! [`Store`](crate::store::Store).

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// ── Identifiers ─────────────────────────────────────────────────────

/// Opaque participant identity, generated once per client.
///
/// An empty string means "nobody" (for example a vacant seat).
pub type Identity = String;

/// Address of the storyteller for direct messages.
pub const HOST_ADDRESS: &str = "host";

/// Stable handle for a player record, independent of its seat index.
///
/// Handles are assigned by the store when a player is inserted and survive
/// swaps, moves and removals of other players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PlayerHandle(pub u64);

impl PlayerHandle {
    /// Placeholder carried by records the store has not adopted yet.
    pub const UNASSIGNED: Self = Self(0);
}

/// Normalizes a role id the way scripts reference them: lower-case ASCII
/// letters and digits only.
pub fn clean_role_id(id: &str) -> String {
    id.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

// ── Roles ───────────────────────────────────────────────────────────

/// Character team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Townsfolk,
    Outsider,
    Minion,
    Demon,
    Traveler,
    Fabled,
    #[default]
    #[serde(other)]
    Default,
}

/// A character definition. Official characters travel on the wire as
/// `{ "id": … }` only; custom characters carry their full definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_night: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_night: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_night_reminder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_night_reminder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reminders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reminders_global: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub setup: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_custom: bool,
}

impl Role {
    /// A bare reference to a character by id.
    pub fn reference(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn is_traveler(&self) -> bool {
        self.team == Some(Team::Traveler)
    }

    /// `true` for the "no character assigned" role.
    pub fn is_unassigned(&self) -> bool {
        self.id.is_empty()
    }

    /// `true` if this definition has what a playable custom character needs.
    pub fn is_complete(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
            && self.ability.as_deref().is_some_and(|a| !a.is_empty())
            && self.team.is_some()
    }

    /// The form in which this role is published to spectators: a bare id for
    /// catalog characters, the definition without night reminders for custom
    /// ones.
    pub fn stripped(&self) -> Self {
        if !self.is_custom {
            return Self::reference(self.id.clone());
        }
        Self {
            first_night_reminder: None,
            other_night_reminder: None,
            is_custom: false,
            ..self.clone()
        }
    }
}

/// A reminder token placed next to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Reminder {
    pub id: String,
    pub role: String,
    pub name: String,
}

// ── Players ─────────────────────────────────────────────────────────

/// A seat in the town square and the player sitting in it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Player {
    pub handle: PlayerHandle,
    pub name: String,
    /// Identity of the participant who claimed this seat; empty if vacant.
    pub id: Identity,
    pub role: Role,
    pub reminders: Vec<Reminder>,
    pub vote_token: bool,
    pub is_dead: bool,
    pub pronouns: String,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.id.is_empty()
    }
}

// ── Edition ─────────────────────────────────────────────────────────

/// A script: the set of characters in play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Edition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_official: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl Edition {
    /// A bare reference to an official edition.
    pub fn reference(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

// ── Grimoire ────────────────────────────────────────────────────────

/// A countdown shown on every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Timer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration: u64,
}

/// Table-wide presentation flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrimoireState {
    pub is_night: bool,
    pub is_ringing: bool,
    pub is_rooster: bool,
    /// Organ Grinder: votes are hidden from players for executions.
    pub is_organ_vote_mode: bool,
    pub timer: Timer,
}

// ── Nominations ─────────────────────────────────────────────────────

/// Either side of a nomination: a seat, a free-form label, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeatRef {
    Seat(usize),
    Label(String),
}

impl SeatRef {
    pub fn seat(&self) -> Option<usize> {
        match self {
            Self::Seat(seat) => Some(*seat),
            Self::Label(_) => None,
        }
    }
}

/// Extra data describing a vote that is not a plain nomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialVote {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_label: Option<String>,
}

/// A judgment up for vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nomination {
    #[serde(default)]
    pub nominator: Option<SeatRef>,
    #[serde(default)]
    pub nominee: Option<SeatRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_vote: Option<SpecialVote>,
}

impl Nomination {
    /// A plain seat-nominates-seat nomination.
    pub fn standard(nominator: usize, nominee: usize) -> Self {
        Self {
            nominator: Some(SeatRef::Seat(nominator)),
            nominee: Some(SeatRef::Seat(nominee)),
            special_vote: None,
        }
    }

    /// A special vote between arbitrary parties.
    pub fn special(
        nominator: Option<SeatRef>,
        nominee: Option<SeatRef>,
        special_vote: SpecialVote,
    ) -> Self {
        Self {
            nominator,
            nominee,
            special_vote: Some(special_vote),
        }
    }

    pub fn nominator_seat(&self) -> Option<usize> {
        self.nominator.as_ref().and_then(SeatRef::seat)
    }

    pub fn nominee_seat(&self) -> Option<usize> {
        self.nominee.as_ref().and_then(SeatRef::seat)
    }

    /// Both parties are seats and no special vote is attached.
    pub fn is_standard(&self) -> bool {
        self.nominator_seat().is_some() && self.nominee_seat().is_some() && self.special_vote.is_none()
    }

    /// A standard nomination of a traveler: judged as an Exile.
    pub fn is_traveler_exile(&self, players: &[Player]) -> bool {
        if !self.is_standard() {
            return false;
        }
        self.nominee_seat()
            .and_then(|seat| players.get(seat))
            .is_some_and(|nominee| nominee.role.is_traveler())
    }

    /// Seat from which votes are counted: the nominee, else the nominator,
    /// else seat 0.
    pub fn rotation_origin(&self) -> usize {
        self.nominee_seat()
            .or_else(|| self.nominator_seat())
            .unwrap_or(0)
    }

    /// Every seat this nomination references exists in a roster of `len`.
    pub fn fits_roster(&self, len: usize) -> bool {
        self.nominator_seat().is_none_or(|seat| seat < len)
            && self.nominee_seat().is_none_or(|seat| seat < len)
    }
}

/// A completed vote, frozen at the moment its nomination ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteHistoryEntry {
    pub timestamp: SystemTime,
    pub nominator: String,
    pub nominee: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub majority: usize,
    /// Names of the players who voted yes, or `None` when withheld from this
    /// observer.
    pub votes: Option<Vec<String>>,
}

// ── Session ─────────────────────────────────────────────────────────

/// Default time between two vote-clock steps, in milliseconds.
pub const DEFAULT_VOTING_SPEED: u64 = 1000;

/// Connection and voting state of the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Channel this client is connected to; empty when offline.
    pub session_id: String,
    pub is_spectator: bool,
    pub is_reconnecting: bool,
    /// Participants currently seen on the channel.
    pub player_count: usize,
    /// Aggregate round-trip latency in milliseconds.
    pub ping: u64,
    /// This client's identity.
    pub player_id: Identity,
    /// Seat this client asked for; `None` means "no seat".
    pub claimed_seat: Option<usize>,
    pub nomination: Option<Nomination>,
    /// One slot per seat while a nomination is active.
    pub votes: Vec<Option<bool>>,
    pub locked_vote: usize,
    pub voting_speed: u64,
    pub is_vote_in_progress: bool,
    pub vote_history: Vec<VoteHistoryEntry>,
    pub marked_player: Option<usize>,
    pub is_vote_history_allowed: bool,
    pub is_roles_distributed: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            is_spectator: false,
            is_reconnecting: false,
            player_count: 0,
            ping: 0,
            player_id: String::new(),
            claimed_seat: None,
            nomination: None,
            votes: Vec::new(),
            locked_vote: 0,
            voting_speed: DEFAULT_VOTING_SPEED,
            is_vote_in_progress: false,
            vote_history: Vec::new(),
            marked_player: None,
            is_vote_history_allowed: true,
            is_roles_distributed: false,
        }
    }
}

// ── Root ────────────────────────────────────────────────────────────

/// The full local state of a client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameState {
    pub grimoire: GrimoireState,
    pub edition: Option<Edition>,
    /// Characters of the current edition, keyed by id.
    pub roles: BTreeMap<String, Role>,
    /// Custom fabled loaded with the current script, keyed by id.
    pub custom_fabled: BTreeMap<String, Role>,
    pub players: Vec<Player>,
    /// Fabled currently in play.
    pub fabled: Vec<Role>,
    pub session: SessionState,
    /// The edition picker should be shown to the user.
    pub edition_selection_open: bool,
}

impl GameState {
    /// Seat index of the player with `handle`.
    pub fn seat_of(&self, handle: PlayerHandle) -> Option<usize> {
        self.players.iter().position(|p| p.handle == handle)
    }

    pub fn player(&self, seat: usize) -> Option<&Player> {
        self.players.get(seat)
    }

    /// Seat currently bound to `identity`.
    pub fn seat_bound_to(&self, identity: &str) -> Option<usize> {
        if identity.is_empty() {
            return None;
        }
        self.players.iter().position(|p| p.id == identity)
    }

    pub fn is_edition_official(&self) -> bool {
        self.edition.as_ref().is_some_and(|e| e.is_official)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn traveler(id: &str) -> Role {
        Role {
            id: id.into(),
            team: Some(Team::Traveler),
            ..Role::default()
        }
    }

    #[test]
    fn clean_role_id_strips_punctuation_and_case() {
        assert_eq!(clean_role_id("Fortune-Teller"), "fortuneteller");
        assert_eq!(clean_role_id("  Po_2 "), "po2");
    }

    #[test]
    fn standard_nomination_requires_two_seats_and_no_special_vote() {
        assert!(Nomination::standard(0, 2).is_standard());
        let labelled = Nomination {
            nominator: Some(SeatRef::Label("Bishop".into())),
            nominee: Some(SeatRef::Seat(2)),
            special_vote: None,
        };
        assert!(!labelled.is_standard());
        let special = Nomination::special(
            Some(SeatRef::Seat(0)),
            Some(SeatRef::Seat(1)),
            SpecialVote {
                kind: "cultleader".into(),
                timer_text: None,
                debate_text: None,
                button_label: None,
            },
        );
        assert!(!special.is_standard());
    }

    #[test]
    fn traveler_exile_depends_on_nominee_team() {
        let mut players = vec![Player::new("a"), Player::new("b")];
        let nomination = Nomination::standard(0, 1);
        assert!(!nomination.is_traveler_exile(&players));
        players[1].role = traveler("beggar");
        assert!(nomination.is_traveler_exile(&players));
    }

    #[test]
    fn rotation_origin_prefers_nominee_then_nominator() {
        assert_eq!(Nomination::standard(1, 3).rotation_origin(), 3);
        let no_nominee = Nomination {
            nominator: Some(SeatRef::Seat(4)),
            nominee: Some(SeatRef::Label("the town".into())),
            special_vote: None,
        };
        assert_eq!(no_nominee.rotation_origin(), 4);
        let nobody = Nomination {
            nominator: None,
            nominee: None,
            special_vote: None,
        };
        assert_eq!(nobody.rotation_origin(), 0);
    }

    #[test]
    fn nomination_wire_shape_uses_null_for_absent_parties() {
        let nomination = Nomination {
            nominator: None,
            nominee: Some(SeatRef::Label("Storyteller".into())),
            special_vote: None,
        };
        let json = serde_json::to_value(&nomination).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "nominator": null, "nominee": "Storyteller" })
        );
        let parsed: Nomination =
            serde_json::from_str(r#"{"nominator":1,"nominee":2}"#).unwrap();
        assert_eq!(parsed, Nomination::standard(1, 2));
    }

    #[test]
    fn stripped_role_drops_reminders_and_custom_flag() {
        let custom = Role {
            id: "alchemist2".into(),
            name: Some("Alchemist".into()),
            team: Some(Team::Townsfolk),
            ability: Some("Learn things.".into()),
            first_night_reminder: Some("Wake".into()),
            is_custom: true,
            ..Role::default()
        };
        let stripped = custom.stripped();
        assert!(stripped.first_night_reminder.is_none());
        assert!(!stripped.is_custom);
        assert_eq!(stripped.name.as_deref(), Some("Alchemist"));

        let official = Role {
            id: "washerwoman".into(),
            name: Some("Washerwoman".into()),
            ..Role::default()
        };
        assert_eq!(official.stripped(), Role::reference("washerwoman"));
    }

    #[test]
    fn unknown_team_deserializes_as_default() {
        let role: Role = serde_json::from_str(r#"{"id":"x","team":"loric"}"#).unwrap();
        assert_eq!(role.team, Some(Team::Default));
    }
}
