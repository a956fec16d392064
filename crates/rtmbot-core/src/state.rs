//! Connection state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the real-time connection.
///
/// The forward path is `Disconnected -> Connecting -> Connected -> Established`.
/// Any state at or past `Connecting` may fall back through `Disconnecting`
/// to `Disconnected`. Variants are declared in forward order so that
/// `Ord` can be used to compare progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no handshake in flight
    #[default]
    Disconnected,

    /// Handshake request in flight
    Connecting,

    /// Socket open, greeting frame not yet observed
    Connected,

    /// Greeting frame observed; sending is permitted
    Established,

    /// Graceful shutdown in progress
    Disconnecting,
}

impl ConnectionState {
    /// Returns true once a connection attempt has started and not yet finished tearing down.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Returns true if outbound messages may be sent in this state.
    pub fn can_send(&self) -> bool {
        matches!(self, Self::Established)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    ///
    /// Staying in the same state is always allowed (it is a no-op).
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Disconnected, Connecting) => true,
            (Connecting, Connected) | (Connected, Established) => true,
            // A failed handshake falls straight back
            (Connecting, Disconnected) => true,
            (Connecting | Connected | Established, Disconnecting) => true,
            (Disconnecting, Disconnected) => true,
            _ => false,
        }
    }

    /// Returns the lowercase label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Established => "established",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
