//! The state container the protocol core reads from and writes to.
//!
//! Protocol code never holds references into [`GameState`] across calls; it
//! reads through [`Store::state`] and changes state only by committing a
//! [`Mutation`]. Any type implementing [`Store`] can back a session, and
//! [`MemoryStore`] is the in-memory implementation used by default.

use std::collections::BTreeMap;

use crate::state::{
    clean_role_id, Edition, GameState, Identity, Nomination, Player, PlayerHandle, Reminder, Role,
    Team, Timer,
};
use crate::voting;

/// Translation key of the history label for traveler exiles.
pub const EXILE_LABEL_KEY: &str = "modal.voteHistory.exile";
/// Translation key of the history label for executions.
pub const EXECUTION_LABEL_KEY: &str = "modal.voteHistory.execution";

// ── Mutations ───────────────────────────────────────────────────────

/// Where a mutation was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Decided by this participant: a user action, or on the host the outcome
    /// of seat arbitration and liveness eviction.
    Local,
    /// A replica of a change another participant already published.
    Remote,
}

/// A mutation together with its origin, as observed by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEnvelope {
    pub mutation: Mutation,
    pub origin: Origin,
}

/// How a vote slot changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteCast {
    /// Flip the current value; an unset slot becomes a yes.
    Toggle,
    Set(Option<bool>),
}

/// A complete voting round, as carried by a full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NominationUpdate {
    pub nomination: Option<Nomination>,
    pub votes: Option<Vec<Option<bool>>>,
    /// `None` or zero keeps the current speed.
    pub voting_speed: Option<u64>,
    pub locked_vote: Option<usize>,
    pub is_vote_in_progress: Option<bool>,
}

/// A change to one player record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerChange {
    Name(String),
    Id(Identity),
    Role(Role),
    IsDead(bool),
    VoteToken(bool),
    Pronouns(String),
    Reminders(Vec<Reminder>),
}

/// Every state change the live session reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    // session
    /// Join the given channel, or leave when empty. The id is normalized.
    SetSessionId(String),
    SetSpectator(bool),
    SetPlayerId(Identity),
    SetReconnecting(bool),
    SetPlayerCount(usize),
    SetPing(u64),
    /// Ask for a seat (`None` leaves the current one).
    ClaimSeat(Option<usize>),
    DistributeRoles(bool),

    // voting
    /// Start a nomination, or end the current one when `None`.
    SetNomination(Option<Nomination>),
    SyncNomination(NominationUpdate),
    SetVoteInProgress(bool),
    Vote { seat: usize, cast: VoteCast },
    /// Advance the lock by one, or jump to the given value.
    LockVote(Option<usize>),
    SetVotingSpeed(u64),
    ClearVoteHistory,
    SetVoteHistoryAllowed(bool),
    SetMarkedPlayer(Option<usize>),

    // players
    AddPlayer(String),
    RemovePlayer(usize),
    SwapPlayers(usize, usize),
    MovePlayer(usize, usize),
    SetPlayers(Vec<Player>),
    ClearPlayers,
    UpdatePlayer {
        player: PlayerHandle,
        change: PlayerChange,
    },
    SetFabled(Vec<Role>),

    // grimoire; `None` flips the flag
    ToggleNight(Option<bool>),
    ToggleRinging(Option<bool>),
    ToggleRooster(Option<bool>),
    ToggleOrganVoteMode(Option<bool>),
    SetTimer(Timer),

    // edition
    SetEdition(Edition),
    SetCustomRoles(Vec<Role>),
    ShowEditionSelection,
}

/// Normalizes a channel id: lower-case ASCII letters and digits, at most ten.
pub fn normalize_session_id(id: &str) -> String {
    clean_role_id(id).chars().take(10).collect()
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Static game data: official characters, fabled, editions and the few
/// translated labels the session needs.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: BTreeMap<String, Role>,
    fabled: BTreeMap<String, Role>,
    editions: BTreeMap<String, Edition>,
    translations: BTreeMap<String, String>,
}

/// Labels for the two kinds of judgment in the vote history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLabels {
    pub exile: String,
    pub execution: String,
}

impl RoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles
            .extend(roles.into_iter().map(|role| (role.id.clone(), role)));
        self
    }

    #[must_use]
    pub fn with_fabled(mut self, fabled: impl IntoIterator<Item = Role>) -> Self {
        self.fabled
            .extend(fabled.into_iter().map(|role| (role.id.clone(), role)));
        self
    }

    /// Register an official edition.
    #[must_use]
    pub fn with_edition(mut self, edition: Edition) -> Self {
        let edition = Edition {
            is_official: true,
            ..edition
        };
        self.editions.insert(edition.id.clone(), edition);
        self
    }

    #[must_use]
    pub fn with_translation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.translations.insert(key.into(), value.into());
        self
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn fabled(&self, id: &str) -> Option<&Role> {
        self.fabled.get(id)
    }

    pub fn edition(&self, id: &str) -> Option<&Edition> {
        self.editions.get(id)
    }

    /// Characters belonging to `edition`, by their own edition tag or by the
    /// edition's role list.
    pub fn roles_of(&self, edition: &Edition) -> BTreeMap<String, Role> {
        self.roles
            .values()
            .filter(|role| {
                role.edition.as_deref() == Some(edition.id.as_str())
                    || edition.roles.contains(&role.id)
            })
            .map(|role| (role.id.clone(), role.clone()))
            .collect()
    }

    /// Translated text for `key`, falling back to the key itself.
    pub fn translate<'a>(&'a self, key: &'a str) -> &'a str {
        match self.translations.get(key) {
            Some(text) => text,
            None => match key {
                EXILE_LABEL_KEY => "Exile",
                EXECUTION_LABEL_KEY => "Execution",
                other => other,
            },
        }
    }

    pub fn history_labels(&self) -> HistoryLabels {
        HistoryLabels {
            exile: self.translate(EXILE_LABEL_KEY).to_owned(),
            execution: self.translate(EXECUTION_LABEL_KEY).to_owned(),
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// An owner of game state that applies [`Mutation`]s.
pub trait Store: Send + 'static {
    /// The current state.
    fn state(&self) -> &GameState;

    /// Static game data used to resolve role and edition references.
    fn catalog(&self) -> &RoleCatalog;

    /// Apply one mutation. Mutations that do not apply to the current state
    /// (an unknown player, an out-of-range seat) leave it unchanged.
    fn commit(&mut self, mutation: &Mutation);
}

/// In-memory [`Store`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: GameState,
    catalog: RoleCatalog,
    next_handle: u64,
}

impl MemoryStore {
    pub fn new(catalog: RoleCatalog) -> Self {
        Self {
            state: GameState::default(),
            catalog,
            next_handle: 0,
        }
    }

    /// Start from an existing state. Players without a handle are adopted.
    pub fn with_state(catalog: RoleCatalog, state: GameState) -> Self {
        let next_handle = state
            .players
            .iter()
            .map(|player| player.handle.0)
            .max()
            .unwrap_or(0);
        let mut store = Self {
            state,
            catalog,
            next_handle,
        };
        let players = std::mem::take(&mut store.state.players);
        let adopted: Vec<Player> = players.into_iter().map(|p| store.adopt(p)).collect();
        store.state.players = adopted;
        store
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    fn adopt(&mut self, mut player: Player) -> Player {
        if player.handle == PlayerHandle::UNASSIGNED {
            self.next_handle += 1;
            player.handle = PlayerHandle(self.next_handle);
        }
        player
    }

    fn player_mut(&mut self, handle: PlayerHandle) -> Option<&mut Player> {
        self.state.players.iter_mut().find(|p| p.handle == handle)
    }

    fn end_nomination(&mut self) {
        let labels = self.catalog.history_labels();
        if let Some(entry) = voting::history_entry(&self.state, &labels) {
            self.state.session.vote_history.push(entry);
        }
    }

    fn set_custom_roles(&mut self, roles: &[Role]) {
        let resolved: Vec<Role> = roles
            .iter()
            .map(|role| {
                let id = clean_role_id(&role.id);
                if let Some(known) = self.catalog.role(&id).or_else(|| self.state.roles.get(&id)) {
                    known.clone()
                } else {
                    Role {
                        id,
                        is_custom: true,
                        ..role.clone()
                    }
                }
            })
            .filter(Role::is_complete)
            .collect();

        let (fabled, roles): (Vec<Role>, Vec<Role>) = resolved
            .into_iter()
            .partition(|role| role.team == Some(Team::Fabled));
        self.state.roles = roles.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.state.custom_fabled = fabled.into_iter().map(|r| (r.id.clone(), r)).collect();
    }
}

fn toggle(flag: &mut bool, value: Option<bool>) {
    *flag = value.unwrap_or(!*flag);
}

impl Store for MemoryStore {
    fn state(&self) -> &GameState {
        &self.state
    }

    fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    fn commit(&mut self, mutation: &Mutation) {
        let session = &mut self.state.session;
        match mutation {
            Mutation::SetSessionId(id) => session.session_id = normalize_session_id(id),
            Mutation::SetSpectator(flag) => session.is_spectator = *flag,
            Mutation::SetPlayerId(id) => session.player_id.clone_from(id),
            Mutation::SetReconnecting(flag) => session.is_reconnecting = *flag,
            Mutation::SetPlayerCount(count) => session.player_count = *count,
            Mutation::SetPing(ping) => session.ping = *ping,
            Mutation::ClaimSeat(seat) => session.claimed_seat = *seat,
            Mutation::DistributeRoles(flag) => session.is_roles_distributed = *flag,

            Mutation::SetNomination(nomination) => {
                if nomination.is_none() {
                    self.end_nomination();
                }
                let seats = self.state.players.len();
                let session = &mut self.state.session;
                session.nomination.clone_from(nomination);
                session.votes = if nomination.is_some() {
                    vec![None; seats]
                } else {
                    Vec::new()
                };
                session.locked_vote = 0;
                session.is_vote_in_progress = false;
            }
            Mutation::SyncNomination(update) => {
                let seats = self.state.players.len();
                session.nomination.clone_from(&update.nomination);
                session.votes = match (&update.nomination, &update.votes) {
                    (Some(_), Some(votes)) => {
                        let mut votes = votes.clone();
                        votes.resize(seats, None);
                        votes
                    }
                    (Some(_), None) => vec![None; seats],
                    (None, _) => Vec::new(),
                };
                if let Some(speed) = update.voting_speed.filter(|speed| *speed > 0) {
                    session.voting_speed = speed;
                }
                session.locked_vote = update.locked_vote.unwrap_or(0);
                session.is_vote_in_progress = update.is_vote_in_progress.unwrap_or(false);
            }
            Mutation::SetVoteInProgress(flag) => session.is_vote_in_progress = *flag,
            Mutation::Vote { seat, cast } => {
                if session.nomination.is_none() || *seat >= self.state.players.len() {
                    return;
                }
                if session.votes.len() <= *seat {
                    session.votes.resize(self.state.players.len(), None);
                }
                if let Some(slot) = session.votes.get_mut(*seat) {
                    *slot = match cast {
                        VoteCast::Toggle => Some(*slot != Some(true)),
                        VoteCast::Set(vote) => *vote,
                    };
                }
            }
            Mutation::LockVote(lock) => {
                session.locked_vote = lock.unwrap_or(session.locked_vote.saturating_add(1));
            }
            Mutation::SetVotingSpeed(speed) => session.voting_speed = *speed,
            Mutation::ClearVoteHistory => session.vote_history.clear(),
            Mutation::SetVoteHistoryAllowed(flag) => session.is_vote_history_allowed = *flag,
            Mutation::SetMarkedPlayer(seat) => session.marked_player = *seat,

            Mutation::AddPlayer(name) => {
                let player = self.adopt(Player::new(name.clone()));
                self.state.players.push(player);
            }
            Mutation::RemovePlayer(index) => {
                if *index < self.state.players.len() {
                    self.state.players.remove(*index);
                }
            }
            Mutation::SwapPlayers(from, to) => {
                let len = self.state.players.len();
                if *from < len && *to < len {
                    self.state.players.swap(*from, *to);
                }
            }
            Mutation::MovePlayer(from, to) => {
                if *from < self.state.players.len() {
                    let player = self.state.players.remove(*from);
                    let to = (*to).min(self.state.players.len());
                    self.state.players.insert(to, player);
                }
            }
            Mutation::SetPlayers(players) => {
                let players: Vec<Player> = players.iter().cloned().map(|p| self.adopt(p)).collect();
                self.state.players = players;
            }
            Mutation::ClearPlayers => {
                self.state.players.clear();
                self.state.fabled.clear();
            }
            Mutation::UpdatePlayer { player, change } => {
                let Some(player) = self.player_mut(*player) else {
                    return;
                };
                match change {
                    PlayerChange::Name(name) => player.name.clone_from(name),
                    PlayerChange::Id(id) => player.id.clone_from(id),
                    PlayerChange::Role(role) => player.role = role.clone(),
                    PlayerChange::IsDead(flag) => player.is_dead = *flag,
                    PlayerChange::VoteToken(flag) => player.vote_token = *flag,
                    PlayerChange::Pronouns(pronouns) => player.pronouns.clone_from(pronouns),
                    PlayerChange::Reminders(reminders) => player.reminders.clone_from(reminders),
                }
            }
            Mutation::SetFabled(fabled) => self.state.fabled.clone_from(fabled),

            Mutation::ToggleNight(value) => toggle(&mut self.state.grimoire.is_night, *value),
            Mutation::ToggleRinging(value) => toggle(&mut self.state.grimoire.is_ringing, *value),
            Mutation::ToggleRooster(value) => toggle(&mut self.state.grimoire.is_rooster, *value),
            Mutation::ToggleOrganVoteMode(value) => {
                toggle(&mut self.state.grimoire.is_organ_vote_mode, *value);
            }
            Mutation::SetTimer(timer) => self.state.grimoire.timer.clone_from(timer),

            Mutation::SetEdition(edition) => {
                if let Some(official) = self.catalog.edition(&edition.id) {
                    self.state.roles = self.catalog.roles_of(official);
                    self.state.edition = Some(official.clone());
                } else {
                    self.state.edition = Some(edition.clone());
                }
                self.state.edition_selection_open = false;
            }
            Mutation::SetCustomRoles(roles) => self.set_custom_roles(roles),
            Mutation::ShowEditionSelection => self.state.edition_selection_open = true,
        }
    }
}
