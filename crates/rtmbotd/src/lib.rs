//! rtmbot agent - real-time connection and handler dispatch
//!
//! This crate provides the moving parts of the agent:
//! - `connection` - handshake, socket ownership, state machine and frame reassembly
//! - `handlers` - the handler contract, registry and built-in handlers
//! - `orchestrator` - `BotService`, which dispatches messages and reconnects
//! - `config` - TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        rtmbotd agent                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   BotService    │────▶│     ConnectionManager       │   │
//! │  │ (orchestrator)  │open │  (socket + state machine)   │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ dispatch                    │ messages          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  handler chain  │◀────│   mpsc::UnboundedSender     │   │
//! │  │ (in order)      │     │   (Message, lossless)       │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate does not panic:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Handler panics are caught at the dispatch boundary and reported

pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod orchestrator;

pub use config::{BotConfig, ConfigError, HandlerDescriptor};
pub use connection::transport::{HttpTransport, SocketCloser, Transport};
pub use connection::{ConnectionEvent, ConnectionManager, SessionInfo};
pub use error::{ConnectionError, HandlerError, TransportError};
pub use handlers::{HandlerOutcome, HandlerRegistry, MessageHandler, MessageSink};
pub use orchestrator::BotService;
