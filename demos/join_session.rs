//! # Join Session Example
//!
//! Joins a live session as a spectator:
//!
//! 1. Connect to the relay and ask the storyteller for the current state
//! 2. Claim a seat once the town square has arrived
//! 3. Log what the storyteller changes
//! 4. Leave on Ctrl+C or when the storyteller ends the game
//!
//! ## Running
//!
//! ```sh
//! cargo run --example join_session -- mygame 2
//!
//! # Point at another relay:
//! GRIMOIRE_RELAY=ws://localhost:8081/ cargo run --example join_session -- mygame
//! ```

use grimoire_live::{
    MemoryStore, Mutation, RoleCatalog, SessionClient, SessionConfig, SessionEvent, Store,
    WebSocketConnector,
};

/// Relay used when `GRIMOIRE_RELAY` is not set.
const DEFAULT_RELAY: &str = "wss://live.clocktower.online:8080/";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let channel = args.next().unwrap_or_else(|| "mygame".to_string());
    let seat: Option<usize> = args.next().and_then(|arg| arg.parse().ok());
    let relay = std::env::var("GRIMOIRE_RELAY").unwrap_or_else(|_| DEFAULT_RELAY.to_string());

    let mut store = MemoryStore::new(RoleCatalog::new());
    store.commit(&Mutation::SetSpectator(true));

    let config = SessionConfig::new(relay);
    let connector = WebSocketConnector::new().with_connect_timeout(std::time::Duration::from_secs(10));
    let (mut client, mut events) = SessionClient::start(connector, store, config);
    client.connect(channel)?;

    let mut seated = false;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    SessionEvent::Connected { channel, role } => {
                        tracing::info!("Connected to {channel} as {role:?}");
                    }

                    SessionEvent::StateChanged(envelope) => {
                        // the roster arrives with the first snapshot
                        if !seated && !client.state().players.is_empty() {
                            if let Some(seat) = seat {
                                client.claim_seat(Some(seat))?;
                                tracing::info!("Asked for seat {seat}");
                            }
                            seated = true;
                        }
                        tracing::debug!("State changed: {:?}", envelope.mutation);
                    }

                    SessionEvent::Reconnecting { retry_in } => {
                        tracing::warn!("Connection lost, retrying in {retry_in:?}");
                    }

                    SessionEvent::Notice { message } => {
                        tracing::info!("Notice: {message}");
                    }

                    SessionEvent::MissingRoles { role_ids } => {
                        tracing::error!("Script needs characters we do not have: {role_ids:?}");
                    }

                    SessionEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("left"));
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    let state = client.state();
    tracing::info!(
        "Left with {} player(s) at the table, {} vote(s) in history",
        state.players.len(),
        state.session.vote_history.len()
    );
    client.shutdown().await;
    Ok(())
}
