//! Agent lifecycle: wires connection events to the handler chain and owns
//! the reconnect policy.
//!
//! ```text
//!              ConnectionManager ──────── mpsc<Message> ─────────────▶ dispatch task
//!                     ▲              │                                  (one message at a
//!                     │              │                                   time, full chain)
//!                     │              └── broadcast<ConnectionEvent> ──▶ supervisor task
//!                     │ open after delay                                (state, errors)
//!              reconnect task ◀──── Disconnected while running ─────────────┘
//! ```
//!
//! Messages are dispatched strictly in arrival order: the dispatch task
//! runs the whole handler chain for one message before receiving the
//! next. Handler failures and panics are reported and treated as
//! `Continue`; they never stop dispatch or the agent.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use rtmbot_core::{ConnectionState, Message};

use crate::config::BotConfig;
use crate::connection::transport::Transport;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::error::HandlerError;
use crate::handlers::{HandlerOutcome, HandlerRegistry, MessageSink, ReadyHandler};

/// Routes an operational error to the log.
///
/// `source` names the component that produced it.
pub fn report_error(source: &'static str, err: &dyn std::error::Error) {
    error!(source, error = %err, "Operational error");
}

// ============================================================================
// Dispatch
// ============================================================================

/// Whether a received message is offered to handlers at all.
///
/// Only plain, visible messages are dispatched; edits, joins, bot
/// messages and hidden events are skipped.
pub fn is_dispatchable(message: &Message) -> bool {
    message.subtype().is_plain() && !message.is_hidden()
}

/// Offers `message` to each handler in order until one completes.
///
/// Returns the name of the handler that completed, or `None` if the
/// message was skipped or every handler continued.
pub async fn dispatch<'a>(
    handlers: &'a [ReadyHandler],
    sink: &dyn MessageSink,
    message: &Message,
    cancel: &CancellationToken,
) -> Option<&'a str> {
    if !is_dispatchable(message) {
        trace!(subtype = %message.subtype(), hidden = message.is_hidden(), "Skipping message");
        return None;
    }

    for ready in handlers {
        let outcome = AssertUnwindSafe(ready.handler().process(sink, message, cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(HandlerOutcome::Complete)) => {
                debug!(handler = %ready.name(), channel = %message.channel(), "Message handled");
                return Some(ready.name());
            }
            Ok(Ok(HandlerOutcome::Continue)) => {}
            Ok(Err(source)) => report_error(
                "handler",
                &HandlerError::Process {
                    name: ready.name().to_string(),
                    source,
                },
            ),
            Err(_) => report_error(
                "handler",
                &HandlerError::Panicked {
                    name: ready.name().to_string(),
                },
            ),
        }
    }

    None
}

async fn dispatch_loop(
    mut inbox: mpsc::UnboundedReceiver<Message>,
    handlers: Arc<Vec<ReadyHandler>>,
    connection: ConnectionManager,
    stop: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            message = inbox.recv() => message,
        };
        let Some(message) = message else {
            break;
        };
        dispatch(&handlers, &connection, &message, &stop).await;
    }
    debug!("Dispatch loop stopped");
}

// ============================================================================
// Reconnect
// ============================================================================

/// Everything needed to reopen the connection from a background task.
#[derive(Clone)]
struct Reconnector {
    connection: ConnectionManager,
    token: String,
    delay: Duration,
    running: Arc<AtomicBool>,
    stop: CancellationToken,
}

impl Reconnector {
    /// Reopens the connection after the fixed delay, unless stopped first.
    fn schedule(&self) {
        let this = self.clone();
        info!(delay_secs = this.delay.as_secs_f64(), "Reconnect scheduled");

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = this.stop.cancelled() => return,
                _ = tokio::time::sleep(this.delay) => {}
            }
            if !this.running.load(Ordering::SeqCst) {
                return;
            }

            info!("Reconnecting");
            if let Err(e) = this.connection.open(&this.token, &this.stop).await {
                report_error("reconnect", &e);
            }
        });
    }
}

async fn supervise(mut events: broadcast::Receiver<ConnectionEvent>, reconnector: Reconnector) {
    loop {
        let event = tokio::select! {
            biased;
            _ = reconnector.stop.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(ConnectionEvent::StateChanged { previous, current }) => {
                info!(from = %previous, to = %current, "Connection state");
                if current == ConnectionState::Disconnected && reconnector.running.load(Ordering::SeqCst) {
                    reconnector.schedule();
                }
            }
            Ok(ConnectionEvent::Error(e)) => report_error("connection", e.as_ref()),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Supervisor lagged behind connection events");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Supervisor stopped");
}

// ============================================================================
// Bot Service
// ============================================================================

/// The running agent.
pub struct BotService {
    config: BotConfig,
    connection: ConnectionManager,
    registry: HandlerRegistry,
    running: Arc<AtomicBool>,
    stop: CancellationToken,
    handlers: Arc<Vec<ReadyHandler>>,
    tasks: Vec<JoinHandle<()>>,
}

impl BotService {
    pub fn new(config: BotConfig, transport: Arc<dyn Transport>, registry: HandlerRegistry) -> Self {
        let connection = ConnectionManager::new(transport, config.close_grace());
        Self {
            config,
            connection,
            registry,
            running: Arc::new(AtomicBool::new(false)),
            stop: CancellationToken::new(),
            handlers: Arc::new(Vec::new()),
            tasks: Vec::new(),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Names of the handlers in the active chain, in order.
    pub fn active_handlers(&self) -> Vec<&str> {
        self.handlers.iter().map(ReadyHandler::name).collect()
    }

    /// Starts the agent.
    ///
    /// Subscribes to messages and connection events, materializes the handler chain
    /// (awaiting each handler in declaration order and keeping only those
    /// that initialized), then opens the connection. A failed open is
    /// reported and retried by the reconnect policy.
    pub async fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Agent already running");
            return;
        }
        self.stop = CancellationToken::new();

        let inbox = self.connection.messages();
        let supervisor_events = self.connection.subscribe();

        let mut ready = Vec::with_capacity(self.config.handlers.len());
        for pending in self.registry.prepare(&self.config.handlers, &self.stop) {
            match pending.ready().await {
                Ok(handler) => ready.push(handler),
                Err(e) => report_error("registry", &e),
            }
        }
        info!(
            active = ready.len(),
            configured = self.config.handlers.len(),
            "Handler chain ready"
        );
        self.handlers = Arc::new(ready);

        self.tasks.push(tokio::spawn(dispatch_loop(
            inbox,
            Arc::clone(&self.handlers),
            self.connection.clone(),
            self.stop.clone(),
        )));
        self.tasks.push(tokio::spawn(supervise(
            supervisor_events,
            Reconnector {
                connection: self.connection.clone(),
                token: self.config.token.clone(),
                delay: self.config.reconnect_delay(),
                running: Arc::clone(&self.running),
                stop: self.stop.clone(),
            },
        )));

        if let Err(e) = self.connection.open(&self.config.token, &self.stop).await {
            report_error("connection", &e);
        }
    }

    /// Stops the agent.
    ///
    /// Suppresses further reconnects, closes the connection, waits for the
    /// background tasks, then runs each handler's shutdown hook in order.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop.cancel();
        self.connection.close().await;

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                report_error("agent", &e);
            }
        }

        let cancel = CancellationToken::new();
        for ready in self.handlers.iter() {
            if let Err(source) = ready.handler().shutdown(&cancel).await {
                report_error(
                    "handler",
                    &HandlerError::Shutdown {
                        name: ready.name().to_string(),
                        source,
                    },
                );
            }
        }
        info!("Agent stopped");
    }

    /// Starts, runs until `shutdown` is cancelled, then stops.
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.start().await;
        shutdown.cancelled().await;
        info!("Shutdown requested");
        self.stop().await;
    }
}
