//! # grimoire-live
//!
//! Live session sync for a storyteller-hosted social deduction game.
//!
//! One participant (the storyteller, or host) owns the authoritative game
//! state and publishes a public projection of it through a relay; everyone
//! else (spectators) mirrors that projection, claims seats, casts votes and
//! keeps the host informed that they are still present.
//!
//! ## Layout
//!
//! - [`session::LiveSession`]: the synchronous protocol core. Feed it
//!   commands and ticks, get back [`session::Effect`]s.
//! - [`client::SessionClient`]: the async shell that drives the core over a
//!   [`Transport`], with heartbeats and automatic reconnects.
//! - [`store::Store`]: where the game state lives; [`store::MemoryStore`] is
//!   the in-memory implementation.
//! - [`protocol::Command`]: the wire catalog, encoded as `[name, params]`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> grimoire_live::Result<()> {
//! use grimoire_live::{
//!     MemoryStore, Mutation, RoleCatalog, SessionClient, SessionConfig, WebSocketConnector,
//! };
//!
//! let mut store = MemoryStore::new(RoleCatalog::new());
//! grimoire_live::Store::commit(&mut store, &Mutation::SetSpectator(true));
//!
//! let config = SessionConfig::new("wss://relay.example.com:8080/");
//! let (client, _events) = SessionClient::start(WebSocketConnector::new(), store, config);
//! client.connect("mygame")?;
//! client.claim_seat(Some(2))?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod client;
pub mod close_code;
pub mod error;
pub mod event;
pub mod liveness;
pub mod protocol;
pub mod replicator;
pub mod seats;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;
pub mod transports;
pub mod voting;

pub use client::{SessionClient, SessionConfig};
pub use close_code::CloseCode;
pub use error::{Result, SessionError};
pub use event::SessionEvent;
pub use liveness::LivenessTracker;
pub use protocol::Command;
pub use session::{Effect, LiveSession, SessionRole};
pub use state::{GameState, Nomination, Player, PlayerHandle, Role};
pub use store::{MemoryStore, Mutation, MutationEnvelope, Origin, RoleCatalog, Store};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
