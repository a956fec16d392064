//! Error types for the agent.
//!
//! - `TransportError`: socket and HTTP failures below the protocol layer
//! - `ConnectionError`: failures of connection-manager operations
//! - `HandlerError`: failures while resolving or running a handler

use rtmbot_core::ConnectionState;
use rtmbot_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Failures of the underlying socket or request channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request/response channel failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The real-time socket failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The socket is no longer open
    #[error("socket closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by `ConnectionManager` operations.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The manager has been disposed
    #[error("connection manager has been disposed")]
    Disposed,

    /// The operation is not valid in the current state
    #[error("invalid connection state: expected {expected}, was {actual}")]
    InvalidState {
        expected: ConnectionState,
        actual: ConnectionState,
    },

    /// The operation was cancelled before it finished
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ConnectionError {
    /// Returns the platform error code, if the platform rejected the request.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Protocol(e) => e.code(),
            _ => None,
        }
    }
}

/// Errors produced while materializing or invoking handlers.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// No factory is registered for the descriptor's kind
    #[error("handler '{name}': unknown kind '{kind}'")]
    UnknownKind { name: String, kind: String },

    /// The factory rejected the descriptor's configuration
    #[error("handler '{name}': construction failed: {source}")]
    Construct {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handler '{name}': initialization failed: {source}")]
    Initialize {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handler '{name}': processing failed: {source}")]
    Process {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handler '{name}': shutdown failed: {source}")]
    Shutdown {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The handler panicked inside initialize or process
    #[error("handler '{name}' panicked")]
    Panicked { name: String },
}

impl HandlerError {
    /// Name of the handler the error belongs to.
    pub fn name(&self) -> &str {
        match self {
            Self::UnknownKind { name, .. }
            | Self::Construct { name, .. }
            | Self::Initialize { name, .. }
            | Self::Process { name, .. }
            | Self::Shutdown { name, .. }
            | Self::Panicked { name } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let err = ConnectionError::InvalidState {
            expected: ConnectionState::Established,
            actual: ConnectionState::Connected,
        };
        assert_eq!(
            err.to_string(),
            "invalid connection state: expected established, was connected"
        );
    }

    #[test]
    fn test_code_passes_through_rejection() {
        let err = ConnectionError::from(ProtocolError::rejected(Some("rate_limited")));
        assert_eq!(err.code(), Some(ErrorCode::RateLimited));
        assert_eq!(ConnectionError::Cancelled.code(), None);
    }

    #[test]
    fn test_handler_error_name() {
        let err = HandlerError::Initialize {
            name: "tfs".to_string(),
            source: anyhow::anyhow!("server unreachable"),
        };
        assert_eq!(err.name(), "tfs");
        assert_eq!(
            err.to_string(),
            "handler 'tfs': initialization failed: server unreachable"
        );
    }
}
