//! Handler contract.
//!
//! A handler is a plugin that inspects each inbound channel message and
//! may reply through a `MessageSink`. Handlers run in declaration order;
//! the first one to return `HandlerOutcome::Complete` ends the chain for
//! that message.
//!
//! - `registry` - resolves configured descriptors into initialized handlers
//! - `builtin` - handlers shipped with the agent

pub mod builtin;
pub mod registry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rtmbot_core::Message;

use crate::error::ConnectionError;

pub use registry::{HandlerFactory, HandlerRegistry, PendingHandler, ReadyHandler};

/// Result of offering a message to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Pass the message on to the next handler
    Continue,
    /// The message was handled; stop the chain
    Complete,
}

/// Capability to post a reply.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ConnectionError>;
}

/// A pluggable message handler.
///
/// `process` is never called concurrently on the same instance, but
/// handlers must still be `Sync` because the chain is shared with the
/// dispatch task.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Prepares the handler. Called once, before any message is offered.
    ///
    /// A failure removes this handler from the chain and affects no other.
    async fn initialize(&mut self, name: &str, cancel: &CancellationToken) -> anyhow::Result<()>;

    /// Offers one message to the handler.
    ///
    /// Errors are reported and treated as `Continue`.
    async fn process(
        &self,
        sink: &dyn MessageSink,
        message: &Message,
        cancel: &CancellationToken,
    ) -> anyhow::Result<HandlerOutcome>;

    /// Called once when the agent stops, after the connection is closed.
    async fn shutdown(&self, _cancel: &CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
}
