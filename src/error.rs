//! Error types for the live session client.

use thiserror::Error;

/// Errors that can occur while running a live session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The remote end closed the connection with a close frame.
    ///
    /// Only a [`CloseCode::Normal`](crate::CloseCode::Normal) closure ends the
    /// session; every other code is treated as an interrupted connection.
    #[error("connection closed ({code}): {reason}")]
    ConnectionClosed {
        /// WebSocket close code sent by the remote end.
        code: u16,
        /// Close reason supplied by the remote end, possibly empty.
        reason: String,
    },

    /// Opening a connection to the relay failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to serialize or deserialize a wire payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A frame was valid JSON but not a recognised `[command, params]` pair.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// The client handle was used after the session task exited.
    #[error("session is not running")]
    NotConnected,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Returns `true` if this error is a clean, normal-closure shutdown by the
    /// remote end.
    pub fn is_normal_closure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { code, .. } if crate::CloseCode::from(*code).is_normal()
        )
    }
}

/// A specialized [`Result`] type for live session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
