//! WebSocket close codes relevant to session lifecycle decisions.
//!
//! The relay closes a connection with [`CloseCode::Normal`] when a session is
//! deliberately ended (optionally with a reason meant for the user). Every
//! other code means the connection was interrupted and should be retried.

use std::fmt;

/// Close codes as defined by RFC 6455 §7.4.1, reduced to the ones the relay
/// and browsers actually produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: the purpose of the connection has been fulfilled.
    Normal,
    /// 1001: the endpoint is going away (server shutdown, page navigation).
    GoingAway,
    /// 1002: protocol error.
    Protocol,
    /// 1003: the endpoint received data it cannot accept.
    Unsupported,
    /// 1006: the connection dropped without a close frame.
    Abnormal,
    /// 1008: a policy violation (e.g. a duplicate identity on the channel).
    Policy,
    /// 1011: the server hit an unexpected condition.
    Error,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    /// Returns `true` only for a normal closure.
    pub fn is_normal(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// The numeric code as sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::Protocol => 1002,
            Self::Unsupported => 1003,
            Self::Abnormal => 1006,
            Self::Policy => 1008,
            Self::Error => 1011,
            Self::Other(code) => code,
        }
    }

    /// Returns a human-readable description of this close code.
    pub fn description(self) -> &'static str {
        match self {
            Self::Normal => "The session was closed normally.",
            Self::GoingAway => "The server is going away. Reconnecting shortly.",
            Self::Protocol => "The connection was closed due to a protocol error.",
            Self::Unsupported => "The server received data it could not accept.",
            Self::Abnormal => "The connection was lost unexpectedly.",
            Self::Policy => "The server rejected the connection.",
            Self::Error => "The server encountered an internal error.",
            Self::Other(_) => "The connection was closed.",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1006 => Self::Abnormal,
            1008 => Self::Policy,
            1011 => Self::Error,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
