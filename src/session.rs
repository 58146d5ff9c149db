//! The live session protocol core.
//!
//! [`LiveSession`] holds no I/O. The async shell feeds it decoded commands,
//! heartbeat ticks and connection lifecycle notifications; it applies the
//! resulting mutations to a [`Store`] and queues [`Effect`]s describing what
//! the shell must do next (send a frame, open or close the connection, tell
//! the user something). Effects are drained with
//! [`take_effects`](LiveSession::take_effects) in the order they were queued.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bridge::{self, Before, Publisher};
use crate::liveness::LivenessTracker;
use crate::protocol::{Command, LockMessage, Ping, PingSubject, VoteMessage};
use crate::replicator;
use crate::seats;
use crate::state::{Identity, HOST_ADDRESS};
use crate::store::{Mutation, MutationEnvelope, Origin, PlayerChange, Store, VoteCast};
use crate::voting;

/// Which side of the table this client sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// The storyteller: owns and publishes the game state.
    Host,
    /// A player or onlooker: receives the public projection.
    Spectator,
}

impl SessionRole {
    pub fn from_spectator(is_spectator: bool) -> Self {
        if is_spectator {
            Self::Spectator
        } else {
            Self::Host
        }
    }

    pub fn is_host(self) -> bool {
        self == Self::Host
    }
}

/// Something the shell has to carry out on behalf of the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write a frame to the relay. Dropped while not connected.
    Send(Command),
    /// Open a connection to the given (normalized) channel.
    Connect(String),
    /// Close the connection and stop retrying.
    Disconnect,
    /// A message for the user.
    Notice(String),
    /// Characters of a custom script this client could not load.
    MissingRoles(Vec<String>),
    /// A mutation was applied to the store.
    Mutated(MutationEnvelope),
}

/// Protocol state of one participant.
#[derive(Debug)]
pub struct LiveSession {
    role: SessionRole,
    identity: Identity,
    liveness: LivenessTracker,
    effects: Vec<Effect>,
}

impl LiveSession {
    pub fn new(ping_interval: Duration) -> Self {
        Self {
            role: SessionRole::Host,
            identity: Identity::new(),
            liveness: LivenessTracker::new(ping_interval),
            effects: Vec::new(),
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    /// Drain the queued effects.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn send(&mut self, command: Command) {
        self.effects.push(Effect::Send(command));
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Apply `mutation` to `store`. Local mutations are also handed to the
    /// bridge, which may queue outbound frames.
    pub fn commit<S: Store>(&mut self, store: &mut S, mutation: Mutation, origin: Origin) {
        let before = Before::capture(&mutation, store.state());
        store.commit(&mutation);
        if matches!(mutation, Mutation::SetPlayerId(_)) {
            self.identity.clone_from(&store.state().session.player_id);
        }

        let outbound = match origin {
            Origin::Local => bridge::observe(
                Publisher {
                    role: self.role,
                    identity: &self.identity,
                },
                &mutation,
                before,
                store.state(),
            ),
            Origin::Remote => Vec::new(),
        };
        let leaving = outbound.iter().any(|e| matches!(e, Effect::Disconnect));

        self.effects
            .push(Effect::Mutated(MutationEnvelope { mutation, origin }));
        self.effects.extend(outbound);

        if leaving {
            self.reset_presence(store);
            self.set_reconnecting(store, false);
        }
    }

    fn commit_all<S: Store>(&mut self, store: &mut S, mutations: Vec<Mutation>, origin: Origin) {
        for mutation in mutations {
            self.commit(store, mutation, origin);
        }
    }

    fn set_player_count<S: Store>(&mut self, store: &mut S, count: usize, origin: Origin) {
        if store.state().session.player_count != count {
            self.commit(store, Mutation::SetPlayerCount(count), origin);
        }
    }

    fn set_ping<S: Store>(&mut self, store: &mut S, ping: u64, origin: Origin) {
        if store.state().session.ping != ping {
            self.commit(store, Mutation::SetPing(ping), origin);
        }
    }

    fn set_reconnecting<S: Store>(&mut self, store: &mut S, reconnecting: bool) {
        if store.state().session.is_reconnecting != reconnecting {
            self.commit(store, Mutation::SetReconnecting(reconnecting), Origin::Local);
        }
    }

    fn reset_presence<S: Store>(&mut self, store: &mut S) {
        self.liveness.reset();
        self.set_player_count(store, 0, Origin::Local);
        self.set_ping(store, 0, Origin::Local);
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Get ready to connect to `channel` and return the relay path to open:
    /// `{channel}/{identity}` for spectators, `{channel}/host` for the host.
    ///
    /// Generates this client's identity on first use.
    pub fn prepare<S: Store>(&mut self, store: &mut S, channel: &str) -> String {
        if store.state().session.player_id.is_empty() {
            let identity = uuid::Uuid::new_v4().simple().to_string();
            self.commit(store, Mutation::SetPlayerId(identity), Origin::Local);
        }
        self.identity.clone_from(&store.state().session.player_id);
        self.role = SessionRole::from_spectator(store.state().session.is_spectator);
        self.reset_presence(store);

        let address = match self.role {
            SessionRole::Spectator => self.identity.as_str(),
            SessionRole::Host => HOST_ADDRESS,
        };
        format!("{channel}/{address}")
    }

    /// The connection is open.
    pub fn on_open<S: Store>(&mut self, store: &mut S, now: Instant) {
        self.set_reconnecting(store, false);
        match self.role {
            SessionRole::Spectator => {
                let request = Command::GetGamestate(self.identity.clone());
                self.send(Command::direct(HOST_ADDRESS, request));
            }
            SessionRole::Host => {
                for command in replicator::full_sync(store.state(), None) {
                    self.send(command);
                }
            }
        }
        self.ping(store, now);
    }

    /// The connection dropped without a normal close; a retry follows.
    pub fn on_interrupted<S: Store>(&mut self, store: &mut S) {
        self.set_reconnecting(store, true);
    }

    /// The relay ended the session. A non-empty `reason` is shown to the user.
    pub fn on_closed<S: Store>(&mut self, store: &mut S, reason: &str) {
        self.commit(store, Mutation::SetSessionId(String::new()), Origin::Remote);
        self.reset_presence(store);
        self.set_reconnecting(store, false);
        if !reason.is_empty() {
            self.effects.push(Effect::Notice(reason.to_owned()));
        }
    }

    // ── Heartbeat ───────────────────────────────────────────────────

    /// Heartbeat tick: the host sweeps its live set, then both sides ping.
    pub fn ping<S: Store>(&mut self, store: &mut S, now: Instant) {
        let subject = match self.role {
            SessionRole::Host => {
                self.presence(store, None, now);
                PingSubject::Count(self.liveness.count())
            }
            SessionRole::Spectator => PingSubject::Identity(self.identity.clone()),
        };
        let ping = store.state().session.ping;
        self.send(Command::Ping(Ping {
            subject,
            latency: (ping > 0).then_some(ping),
        }));
    }

    /// Host bookkeeping shared by pings, claims and heartbeat ticks: evict
    /// stale participants and free their seats, then record `sender`.
    fn presence<S: Store>(
        &mut self,
        store: &mut S,
        sender: Option<(&str, Option<u64>)>,
        now: Instant,
    ) {
        let evicted = self.liveness.sweep(now);
        if !evicted.is_empty() {
            info!(?evicted, "participants timed out");
            let released = seats::release(store.state(), &evicted);
            self.commit_all(store, released, Origin::Local);
        }

        if let Some((identity, latency)) = sender.filter(|(identity, _)| !identity.is_empty()) {
            self.liveness.touch(identity, now);
            if let Some(ms) = latency {
                if !self.liveness.record_latency(identity, ms) {
                    debug!(identity, latency = ms, "latency sample out of range");
                }
            }
        }
        if let Some(ping) = self.liveness.aggregate_ping() {
            self.set_ping(store, ping, Origin::Local);
        }
        let count = self.liveness.count();
        self.set_player_count(store, count, Origin::Local);
    }

    // ── Incoming commands ───────────────────────────────────────────

    /// Handle one decoded command from the relay.
    pub fn handle<S: Store>(&mut self, store: &mut S, command: Command, now: Instant) {
        let host = self.role.is_host();
        match command {
            Command::Vote(vote) => self.receive_vote(store, vote),
            Command::Pronouns { seat, pronouns } => {
                if let Some(player) = store.state().player(seat) {
                    let mutation = Mutation::UpdatePlayer {
                        player: player.handle,
                        change: PlayerChange::Pronouns(pronouns),
                    };
                    self.commit(store, mutation, Origin::Remote);
                }
            }
            Command::Ping(ping) => self.receive_ping(store, ping, now),
            Command::Direct(recipients) => {
                for (target, nested) in recipients {
                    let addressed = target == self.identity || (host && target == HOST_ADDRESS);
                    if addressed {
                        self.handle(store, nested, now);
                    }
                }
            }

            Command::GetGamestate(identity) if host => {
                debug!(%identity, "sending snapshot");
                for command in replicator::full_sync(store.state(), Some(&identity)) {
                    self.send(command);
                }
            }
            Command::Claim { seat, identity } if host => {
                let changes = seats::arbitrate(store.state(), seat.0, &identity);
                if changes.is_empty() {
                    debug!(seat = ?seat.0, %identity, "claim ignored");
                }
                self.commit_all(store, changes, Origin::Local);
                self.presence(store, Some((&identity, None)), now);
            }
            Command::Bye(identity) if host => {
                self.liveness.remove(&identity);
                let count = self.liveness.count();
                self.set_player_count(store, count, Origin::Local);
            }
            Command::GetGamestate(_) | Command::Claim { .. } | Command::Bye(_) => {
                debug!(command = command.name(), "ignoring request meant for the host");
            }

            push if host => {
                debug!(command = push.name(), "ignoring push while hosting");
            }
            push => self.apply_push(store, push),
        }
    }

    fn receive_vote<S: Store>(&mut self, store: &mut S, vote: VoteMessage) {
        if vote.seat >= store.state().players.len() {
            debug!(seat = vote.seat, "vote for unknown seat ignored");
            return;
        }
        if !voting::accepts_vote(store.state(), vote.seat, vote.from_host) {
            debug!(seat = vote.seat, "vote behind the lock ignored");
            return;
        }
        let cast = vote
            .vote
            .map_or(VoteCast::Toggle, |value| VoteCast::Set(Some(value)));
        self.commit(
            store,
            Mutation::Vote {
                seat: vote.seat,
                cast,
            },
            Origin::Remote,
        );
    }

    fn receive_ping<S: Store>(&mut self, store: &mut S, ping: Ping, now: Instant) {
        match (self.role, ping.subject) {
            (SessionRole::Host, PingSubject::Identity(identity)) => {
                self.presence(store, Some((&identity, ping.latency)), now);
            }
            (SessionRole::Host, PingSubject::Count(_)) => self.presence(store, None, now),
            (SessionRole::Spectator, subject) => {
                if let Some(latency) = ping.latency.filter(|ms| *ms > 0) {
                    self.set_ping(store, latency, Origin::Remote);
                }
                if let PingSubject::Count(count) = subject {
                    if count > 0 {
                        self.set_player_count(store, count, Origin::Remote);
                    }
                }
            }
        }
    }

    fn receive_lock<S: Store>(&mut self, store: &mut S, lock: LockMessage) {
        // the last lock step is one past the final seat
        if lock.locked_vote > store.state().players.len() + 1 {
            debug!(locked_vote = lock.locked_vote, "lock past the end ignored");
            return;
        }
        self.commit(store, Mutation::LockVote(Some(lock.locked_vote)), Origin::Remote);
        if lock.locked_vote <= 1 {
            return;
        }
        let Some(seat) = voting::locked_position(store.state()) else {
            return;
        };
        let current = store.state().session.votes.get(seat).copied().flatten();
        if current != lock.vote {
            let cast = VoteCast::Set(lock.vote);
            self.commit(store, Mutation::Vote { seat, cast }, Origin::Remote);
        }
    }

    /// A storyteller push, applied on a spectator.
    fn apply_push<S: Store>(&mut self, store: &mut S, command: Command) {
        let remote = Origin::Remote;
        match command {
            Command::Edition(payload) => {
                let changes = replicator::edition_changes(&payload);
                self.commit_all(store, changes, remote);
                let missing = payload
                    .roles
                    .as_deref()
                    .and_then(|roles| replicator::missing_roles(store.state(), roles));
                if let Some(missing) = missing {
                    self.reject_script(store, missing);
                }
            }
            Command::Fabled(fabled) => {
                let fabled = replicator::resolve_fabled(store.state(), store.catalog(), &fabled);
                self.commit(store, Mutation::SetFabled(fabled), remote);
            }
            Command::Gamestate(payload) => {
                let resize = replicator::reconcile_length(store.state(), &payload.gamestate);
                self.commit_all(store, resize, remote);
                let fields =
                    replicator::roster_changes(store.state(), store.catalog(), &payload.gamestate);
                self.commit_all(store, fields, remote);
                if !payload.is_lightweight {
                    let flags = replicator::flag_changes(store.state(), store.catalog(), &payload);
                    self.commit_all(store, flags, remote);
                }
            }
            Command::Player(update) => {
                if let Some(mutation) =
                    replicator::player_update(store.state(), store.catalog(), &update)
                {
                    self.commit(store, mutation, remote);
                }
            }
            Command::Nomination(nomination) => {
                self.commit(store, Mutation::SetNomination(nomination), remote);
            }
            Command::Swap(from, to) => self.commit(store, Mutation::SwapPlayers(from, to), remote),
            Command::Move(from, to) => self.commit(store, Mutation::MovePlayer(from, to), remote),
            Command::Remove(index) => self.commit(store, Mutation::RemovePlayer(index), remote),
            Command::Marked(seat) => self.commit(store, Mutation::SetMarkedPlayer(seat.0), remote),
            Command::IsNight(flag) => self.commit(store, Mutation::ToggleNight(Some(flag)), remote),
            Command::IsOrganVoteMode(flag) => {
                self.commit(store, Mutation::ToggleOrganVoteMode(Some(flag)), remote);
            }
            Command::IsRinging(flag) => {
                self.commit(store, Mutation::ToggleRinging(Some(flag)), remote);
            }
            Command::IsRooster(flag) => {
                self.commit(store, Mutation::ToggleRooster(Some(flag)), remote);
            }
            Command::SetTimer(timer) => self.commit(store, Mutation::SetTimer(timer), remote),
            Command::IsVoteHistoryAllowed(flag) => {
                self.commit(store, Mutation::SetVoteHistoryAllowed(flag), remote);
                self.commit(store, Mutation::ClearVoteHistory, remote);
            }
            Command::VotingSpeed(speed) => {
                self.commit(store, Mutation::SetVotingSpeed(speed), remote);
            }
            Command::ClearVoteHistory => self.commit(store, Mutation::ClearVoteHistory, remote),
            Command::IsVoteInProgress(flag) => {
                self.commit(store, Mutation::SetVoteInProgress(flag), remote);
            }
            Command::Lock(lock) => self.receive_lock(store, lock),
            other => debug!(command = other.name(), "unhandled push"),
        }
    }

    /// The storyteller's script references characters this client does not
    /// have: tell the user, leave the session and reopen the edition picker.
    fn reject_script<S: Store>(&mut self, store: &mut S, missing: Vec<String>) {
        warn!(?missing, "custom script could not be loaded");
        let notice = format!(
            "This session uses custom characters that could not be found. \
             Load them before joining. Missing roles: {}",
            missing.join(", ")
        );
        self.effects.push(Effect::MissingRoles(missing));
        self.effects.push(Effect::Notice(notice));
        self.commit(store, Mutation::SetSessionId(String::new()), Origin::Local);
        self.commit(store, Mutation::ShowEditionSelection, Origin::Local);
    }
}
