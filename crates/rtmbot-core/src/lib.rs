//! rtmbot Core - Shared types for the chat agent
//!
//! This crate provides the domain types shared between the wire
//! protocol (rtmbot-protocol) and the agent (rtmbotd): messages,
//! attachments and the connection state machine.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod attachment;
pub mod error;
pub mod message;
pub mod state;
pub mod subtype;

// Re-exports for convenience
pub use attachment::{Attachment, AttachmentField};
pub use error::{DomainError, DomainResult};
pub use message::Message;
pub use state::ConnectionState;
pub use subtype::{MessageSubtype, SubtypeCategory};
