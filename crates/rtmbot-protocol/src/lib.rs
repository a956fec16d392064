//! rtmbot Protocol - Wire encoding for the chat platform
//!
//! This crate is the serialization boundary between the agent and the
//! chat platform: the handshake envelope, real-time event frames, the
//! form-encoded outbound message, and the platform's error codes.

pub mod error;
pub mod event;
pub mod handshake;
pub mod outbound;

pub use error::{ErrorCode, ProtocolError};
pub use event::{decode_event, RawMessage, RtmEvent};
pub use handshake::{ApiResponse, ChannelSummary, HandshakeResponse, SelfInfo};
pub use outbound::OutboundForm;
