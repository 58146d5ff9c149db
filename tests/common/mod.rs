#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the live session integration tests.
//!
//! [`MockTransport`] is fed from a channel held by a [`Remote`], which plays
//! the relay: it pushes frames, closes the connection and inspects what the
//! client sent. [`MockConnector`] hands out scripted connection outcomes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use grimoire_live::protocol::Command;
use grimoire_live::state::Player;
use grimoire_live::{
    Connector, MemoryStore, Mutation, RoleCatalog, SessionError, SessionEvent, Store, Transport,
};
use tokio::sync::mpsc;

type Incoming = Option<Result<String, SessionError>>;

// ── MockTransport ───────────────────────────────────────────────────

pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), SessionError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // the remote end was dropped; stay quiet until shutdown
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// The relay side of one [`MockTransport`].
#[derive(Clone)]
pub struct Remote {
    tx: mpsc::UnboundedSender<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Remote {
    pub fn push(&self, command: &Command) {
        self.push_raw(&command.encode().unwrap());
    }

    pub fn push_raw(&self, frame: &str) {
        let _ = self.tx.send(Some(Ok(frame.to_owned())));
    }

    /// Close with a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Some(Err(SessionError::ConnectionClosed {
            code,
            reason: reason.to_owned(),
        })));
    }

    /// End the stream without a close frame.
    pub fn cut(&self) {
        let _ = self.tx.send(None);
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|frame| Command::decode(frame).unwrap())
            .collect()
    }

    pub fn sent_named(&self, name: &str) -> Vec<Command> {
        self.sent()
            .into_iter()
            .filter(|command| command.name() == name)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

pub fn link() -> (MockTransport, Remote) {
    let (tx, incoming) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let transport = MockTransport {
        incoming,
        sent: Arc::clone(&sent),
        closed: Arc::clone(&closed),
    };
    (transport, Remote { tx, sent, closed })
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out scripted outcomes in order and records every URL requested.
/// Once the script runs out, attempts fail.
#[derive(Clone, Default)]
pub struct MockConnector {
    script: Arc<StdMutex<VecDeque<Result<MockTransport, SessionError>>>>,
    pub urls: Arc<StdMutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful connection and return its relay side.
    pub fn accept(&self) -> Remote {
        let (transport, remote) = link();
        self.script.lock().unwrap().push_back(Ok(transport));
        remote
    }

    pub fn refuse(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(SessionError::Connect(reason.to_owned())));
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport, SessionError> {
        self.urls.lock().unwrap().push(url.to_owned());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::Connect("no relay".into())))
    }
}

// ── Stores ──────────────────────────────────────────────────────────

pub fn seated(ids: &[&str]) -> Vec<Player> {
    ids.iter()
        .enumerate()
        .map(|(seat, id)| Player {
            id: (*id).to_owned(),
            ..Player::new(format!("Player {seat}"))
        })
        .collect()
}

pub fn host_store(ids: &[&str]) -> MemoryStore {
    let mut store = MemoryStore::new(RoleCatalog::new());
    store.commit(&Mutation::SetPlayers(seated(ids)));
    store.commit(&Mutation::SetPlayerId("storyteller".into()));
    store
}

pub fn spectator_store(identity: &str) -> MemoryStore {
    let mut store = MemoryStore::new(RoleCatalog::new());
    store.commit(&Mutation::SetSpectator(true));
    store.commit(&Mutation::SetPlayerId(identity.into()));
    store
}

// ── Waiting ─────────────────────────────────────────────────────────

/// Next event that is not a state change notification.
pub async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed");
        if !matches!(event, SessionEvent::StateChanged(_)) {
            return event;
        }
    }
}

/// Poll `condition` in small steps of (virtual) time.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
