//! Transport abstraction for the live session relay.
//!
//! The relay forwards text frames between everyone on a channel. A
//! [`Transport`] is one open connection; a [`Connector`] opens new ones, since
//! the session reconnects on its own after an interruption.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use grimoire_live::error::SessionError;
//! use grimoire_live::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), SessionError> {
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, url: &str) -> Result<MyTransport, SessionError> {
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SessionError;

/// A bidirectional text frame channel to the relay.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame
/// and each call to [`recv`](Transport::recv) yields one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: it is polled inside
/// `tokio::select!`, and a cancelled call must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, frame: String) -> Result<(), SessionError>;

    /// Receive the next text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a frame arrived
    /// - `Some(Err(SessionError::ConnectionClosed { .. }))`: the relay sent a
    ///   close frame; only code 1000 ends the session
    /// - `Some(Err(e))`: any other transport failure
    /// - `None`: the stream ended without a close frame
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the connection with a normal closure.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// either way.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens connections to the relay.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Connect to `url`: the relay URL followed by the channel path
    /// (`{channel}/{identity}` or `{channel}/host`).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] (or [`SessionError::Io`]) when the
    /// connection cannot be established.
    async fn connect(&self, url: &str) -> Result<Self::Transport, SessionError>;
}
