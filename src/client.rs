//! Async shell around the live session core.
//!
//! [`SessionClient`] is a thin handle that forwards local mutations to a
//! background task over an unbounded MPSC channel. The task owns the store,
//! the [`LiveSession`] core and the current connection, and multiplexes the
//! command channel, incoming frames, a pending connection attempt, the
//! heartbeat deadline and the reconnect deadline with `tokio::select!`.
//! Events are emitted on a bounded channel returned from
//! [`SessionClient::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> grimoire_live::Result<()> {
//! use grimoire_live::{
//!     MemoryStore, RoleCatalog, SessionClient, SessionConfig, SessionEvent, WebSocketConnector,
//! };
//!
//! let config = SessionConfig::new("wss://relay.example.com:8080/");
//! let store = MemoryStore::new(RoleCatalog::new());
//! let (client, mut events) = SessionClient::start(WebSocketConnector::new(), store, config);
//!
//! client.connect("mygame")?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Notice { message } => println!("{message}"),
//!         SessionEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::liveness::DEFAULT_PING_INTERVAL;
use crate::protocol::Command;
use crate::session::{Effect, LiveSession};
use crate::state::GameState;
use crate::store::{Mutation, Origin, Store, VoteCast};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default wait before retrying an interrupted connection.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SessionClient`].
///
/// # Example
///
/// ```
/// use grimoire_live::client::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("wss://relay.example.com:8080/")
///     .with_ping_interval(Duration::from_secs(10))
///     .with_event_channel_capacity(0);
/// assert_eq!(config.event_channel_capacity, 1);
/// assert_eq!(config.reconnect_delay, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay URL; the channel path is appended verbatim, so it usually ends
    /// with `/`.
    pub server_url: String,
    /// Heartbeat interval. Participants silent for twice this long are
    /// evicted by the host.
    ///
    /// Defaults to **30 seconds**.
    pub ping_interval: Duration,
    /// Wait before retrying after an abnormal close.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning)
    /// rather than blocking the session. `Disconnected` is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time [`SessionClient::shutdown`] gives the background task to close
    /// the connection before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Full URL for a channel path.
    pub fn address(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running live session.
///
/// Every method queues a local mutation for the background task and returns
/// immediately. The mutation is applied to the store and published to the
/// table when the role allows it.
pub struct SessionClient {
    cmd_tx: mpsc::UnboundedSender<Mutation>,
    state_rx: watch::Receiver<GameState>,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SessionClient {
    /// Spawn the session task and return a handle plus the event receiver.
    ///
    /// If the store already names a channel, connecting starts right away.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C, S>(
        connector: C,
        store: S,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>)
    where
        C: Connector,
        S: Store,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Mutation>();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (state_tx, state_rx) = watch::channel(store.state().clone());
        let shutdown_timeout = config.shutdown_timeout;

        let session_loop = SessionLoop {
            connector: Arc::new(connector),
            store,
            session: LiveSession::new(config.ping_interval),
            config,
            channel: None,
            transport: None,
            connecting: None,
            heartbeat_at: None,
            reconnect_at: None,
            event_tx,
            state_tx,
        };
        let task = tokio::spawn(session_loop.run(cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            state_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };
        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Apply a local mutation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the session task has exited.
    pub fn commit(&self, mutation: Mutation) -> Result<()> {
        self.cmd_tx
            .send(mutation)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Join `channel`, or host it when the store is not in spectator mode.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the session task has exited.
    pub fn connect(&self, channel: impl Into<String>) -> Result<()> {
        self.commit(Mutation::SetSessionId(channel.into()))
    }

    /// Leave the current channel. Spectators say goodbye to the host first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the session task has exited.
    pub fn disconnect(&self) -> Result<()> {
        self.commit(Mutation::SetSessionId(String::new()))
    }

    /// Ask the host for `seat`, or give up the current seat with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the session task has exited.
    pub fn claim_seat(&self, seat: Option<usize>) -> Result<()> {
        self.commit(Mutation::ClaimSeat(seat))
    }

    /// Cast or change the vote of `seat`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the session task has exited.
    pub fn vote(&self, seat: usize, cast: VoteCast) -> Result<()> {
        self.commit(Mutation::Vote { seat, cast })
    }

    /// Shut down the session, closing the connection and stopping the task.
    ///
    /// The event receiver yields a final `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("SessionClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session task aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Latest state snapshot.
    pub fn state(&self) -> GameState {
        self.state_rx.borrow().clone()
    }

    /// A receiver notified after every batch of applied mutations.
    pub fn subscribe_state(&self) -> watch::Receiver<GameState> {
        self.state_rx.clone()
    }

    /// Returns `true` while the background task is alive.
    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state_rx.borrow();
        f.debug_struct("SessionClient")
            .field("channel", &state.session.session_id)
            .field("spectator", &state.session.is_spectator)
            .field("running", &self.is_running())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// What woke the session loop.
enum Wake<T> {
    Command(Option<Mutation>),
    Shutdown,
    Opened(std::result::Result<Result<T>, JoinError>),
    Frame(Option<Result<String>>),
    Heartbeat,
    Reconnect,
}

struct SessionLoop<C: Connector, S: Store> {
    connector: Arc<C>,
    store: S,
    session: LiveSession,
    config: SessionConfig,
    /// Channel the user wants to be on; `None` after leaving.
    channel: Option<String>,
    transport: Option<C::Transport>,
    connecting: Option<JoinHandle<Result<C::Transport>>>,
    heartbeat_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<GameState>,
}

impl<C: Connector, S: Store> SessionLoop<C, S> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Mutation>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("session loop started");

        let stored = self.store.state().session.session_id.clone();
        if !stored.is_empty() {
            self.begin_connect(stored).await;
            self.drain().await;
        }

        loop {
            let wake = tokio::select! {
                mutation = cmd_rx.recv() => Wake::Command(mutation),
                _ = &mut shutdown_rx => Wake::Shutdown,
                opened = join_pending(&mut self.connecting) => Wake::Opened(opened),
                frame = recv_frame(&mut self.transport) => Wake::Frame(frame),
                () = sleep_until(self.heartbeat_at) => Wake::Heartbeat,
                () = sleep_until(self.reconnect_at) => Wake::Reconnect,
            };

            match wake {
                Wake::Command(Some(mutation)) => {
                    self.session.commit(&mut self.store, mutation, Origin::Local);
                }
                Wake::Command(None) => {
                    debug!("command channel closed, shutting down session loop");
                    self.teardown().await;
                    emit_disconnected(&self.event_tx, Some("client shut down".into())).await;
                    break;
                }
                Wake::Shutdown => {
                    debug!("shutdown signal received");
                    self.teardown().await;
                    emit_disconnected(&self.event_tx, Some("client shut down".into())).await;
                    break;
                }
                Wake::Opened(opened) => {
                    self.connecting = None;
                    self.on_opened(opened).await;
                }
                Wake::Frame(frame) => self.on_frame(frame).await,
                Wake::Heartbeat => {
                    let now = Instant::now();
                    self.heartbeat_at = Some(now + self.config.ping_interval);
                    self.session.ping(&mut self.store, now);
                }
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    if let Some(channel) = self.channel.clone() {
                        info!(channel = %channel, "reconnecting");
                        self.begin_connect(channel).await;
                    }
                }
            }
            self.drain().await;
        }

        debug!("session loop exited");
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Close any connection and start a new attempt for `channel`.
    async fn begin_connect(&mut self, channel: String) {
        self.teardown().await;
        let path = self.session.prepare(&mut self.store, &channel);
        let url = self.config.address(&path);
        debug!(channel = %channel, url = %url, "opening connection");

        let connector = Arc::clone(&self.connector);
        self.connecting = Some(tokio::spawn(async move { connector.connect(&url).await }));
        self.channel = Some(channel);
    }

    async fn on_opened(&mut self, opened: std::result::Result<Result<C::Transport>, JoinError>) {
        let transport = match opened {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                warn!("connection attempt failed: {e}");
                self.interrupt();
                return;
            }
            Err(join_err) => {
                warn!("connection attempt aborted: {join_err}");
                self.interrupt();
                return;
            }
        };

        let Some(channel) = self.channel.clone() else {
            // left while the attempt was in flight
            let mut transport = transport;
            let _ = transport.close().await;
            return;
        };
        info!(channel = %channel, role = ?self.session.role(), "connected");
        self.transport = Some(transport);
        let now = Instant::now();
        self.heartbeat_at = Some(now + self.config.ping_interval);
        self.emit_event(SessionEvent::Connected {
            channel,
            role: self.session.role(),
        });
        self.session.on_open(&mut self.store, now);
    }

    async fn on_frame(&mut self, frame: Option<Result<String>>) {
        match frame {
            Some(Ok(text)) => match Command::decode(&text) {
                Ok(command) => {
                    debug!(command = command.name(), "received");
                    self.session.handle(&mut self.store, command, Instant::now());
                }
                Err(e) => warn!("dropping malformed frame: {e} (raw: {text})"),
            },
            Some(Err(SessionError::ConnectionClosed { code, reason }))
                if crate::CloseCode::from(code).is_normal() =>
            {
                info!(reason = %reason, "relay closed the session");
                self.transport = None;
                self.heartbeat_at = None;
                self.channel = None;
                self.session.on_closed(&mut self.store, &reason);
                self.drain().await;
                let reason = (!reason.is_empty()).then_some(reason);
                emit_disconnected(&self.event_tx, reason).await;
            }
            Some(Err(e)) => {
                warn!("connection interrupted: {e}");
                self.interrupt();
            }
            None => {
                warn!("connection ended without a close frame");
                self.interrupt();
            }
        }
    }

    /// The connection is gone but the user still wants the channel.
    fn interrupt(&mut self) {
        self.transport = None;
        self.heartbeat_at = None;
        if self.channel.is_none() {
            return;
        }
        let retry_in = self.config.reconnect_delay;
        self.reconnect_at = Some(Instant::now() + retry_in);
        self.session.on_interrupted(&mut self.store);
        self.emit_event(SessionEvent::Reconnecting { retry_in });
    }

    /// Drop the connection, any attempt in flight and both timers.
    async fn teardown(&mut self) {
        if let Some(pending) = self.connecting.take() {
            pending.abort();
        }
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("close failed: {e}");
            }
        }
        self.heartbeat_at = None;
        self.reconnect_at = None;
    }

    // ── Effects ─────────────────────────────────────────────────────

    /// Carry out everything the core queued, including effects queued while
    /// doing so, then publish the new state.
    async fn drain(&mut self) {
        let mut changed = false;
        loop {
            let effects = self.session.take_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                changed |= self.carry_out(effect).await;
            }
        }
        if changed {
            self.state_tx.send_replace(self.store.state().clone());
        }
    }

    /// Returns `true` if the effect reports a state change.
    async fn carry_out(&mut self, effect: Effect) -> bool {
        match effect {
            Effect::Send(command) => self.send(command).await,
            Effect::Connect(channel) => self.begin_connect(channel).await,
            Effect::Disconnect => {
                let active = self.channel.take().is_some()
                    || self.transport.is_some()
                    || self.connecting.is_some();
                self.teardown().await;
                if active {
                    emit_disconnected(&self.event_tx, None).await;
                }
            }
            Effect::Notice(message) => self.emit_event(SessionEvent::Notice { message }),
            Effect::MissingRoles(role_ids) => {
                self.emit_event(SessionEvent::MissingRoles { role_ids });
            }
            Effect::Mutated(envelope) => {
                self.emit_event(SessionEvent::StateChanged(envelope));
                return true;
            }
        }
        false
    }

    async fn send(&mut self, command: Command) {
        let Some(transport) = self.transport.as_mut() else {
            debug!(command = command.name(), "not connected, dropping");
            return;
        };
        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode {}: {e}", command.name());
                return;
            }
        };
        if let Err(e) = transport.send(frame).await {
            error!("transport send error: {e}");
            self.interrupt();
        }
    }

    /// Emit an event; when the channel is full, log and drop it rather than
    /// stall the session.
    fn emit_event(&self, event: SessionEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("event channel full, dropping event: {}", dropped.kind());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

}

impl<C: Connector, S: Store> Drop for SessionLoop<C, S> {
    fn drop(&mut self) {
        if let Some(pending) = self.connecting.take() {
            pending.abort();
        }
    }
}

/// `Disconnected` is never dropped, so this waits for channel capacity.
async fn emit_disconnected(event_tx: &mpsc::Sender<SessionEvent>, reason: Option<String>) {
    let event = SessionEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── select! helpers ─────────────────────────────────────────────────

async fn join_pending<T>(
    pending: &mut Option<JoinHandle<T>>,
) -> std::result::Result<T, JoinError> {
    match pending {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn recv_frame<T: Transport>(transport: &mut Option<T>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
