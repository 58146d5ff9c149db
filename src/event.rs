//! Events emitted by a running [`SessionClient`](crate::client::SessionClient).

use std::time::Duration;

use crate::session::SessionRole;
use crate::store::MutationEnvelope;

/// Everything the application shell may want to react to.
///
/// Events arrive on the bounded channel returned by
/// [`SessionClient::start`](crate::client::SessionClient::start). When the
/// consumer falls behind, events other than
/// [`Disconnected`](SessionEvent::Disconnected) are dropped with a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection to the relay opened.
    Connected {
        /// Normalized channel id.
        channel: String,
        role: SessionRole,
    },
    /// The session ended: a manual disconnect, a normal closure by the relay,
    /// or client shutdown. No reconnect follows.
    Disconnected { reason: Option<String> },
    /// The connection was interrupted; another attempt follows after
    /// `retry_in`.
    Reconnecting { retry_in: Duration },
    /// A message for the user, e.g. the relay's close reason.
    Notice { message: String },
    /// The storyteller's custom script references characters that could not
    /// be loaded. The session has been left.
    MissingRoles { role_ids: Vec<String> },
    /// A mutation was applied to the store.
    StateChanged(MutationEnvelope),
}

impl SessionEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Notice { .. } => "notice",
            Self::MissingRoles { .. } => "missing_roles",
            Self::StateChanged(_) => "state_changed",
        }
    }
}
