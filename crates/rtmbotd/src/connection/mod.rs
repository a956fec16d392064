//! Real-time connection manager.
//!
//! Owns the socket, performs the handshake, runs the state machine and
//! publishes what it sees to subscribers.
//!
//! # Architecture
//!
//! ```text
//!   open(token)
//!       │
//!       ▼
//!  ┌──────────┐ handshake ┌──────────┐  socket   ┌───────────────┐
//!  │Connecting│──────────▶│Connected │──────────▶│ receive loop  │
//!  └──────────┘           └──────────┘           │ (FrameReader) │
//!                                                └───┬───────┬───┘
//!                                hello ⇒ Established │       │ message
//!                                                    ▼       ▼
//!                      broadcast<ConnectionEvent>          mpsc<Message>
//!                      (state changes, errors)             (one per subscriber)
//! ```
//!
//! Every state change is published exactly once, in order, as a
//! `ConnectionEvent::StateChanged`; setting the current value again is a
//! no-op. The current state is also observable through a `watch` channel.
//!
//! Received messages never go through the broadcast channel, which drops
//! events for subscribers that fall behind. Each `messages()` subscriber
//! gets its own unbounded queue, so a slow consumer sees every message in
//! arrival order.
//!
//! # Concurrency
//!
//! The socket handle and the in-flight attempt live in one slot behind a
//! mutex. `open` claims the slot with a compare-and-set on the state, and
//! `close` takes the socket out of it, so overlapping closes perform at
//! most one graceful shutdown. The lock is never held across an await.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` in production paths
//! - Poisoned locks are recovered with `PoisonError::into_inner`
//! - Broadcast sends without subscribers are ignored

pub mod framing;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use rtmbot_core::{ConnectionState, Message};
use rtmbot_protocol::{decode_event, HandshakeResponse, OutboundForm, ProtocolError, RtmEvent};

use crate::error::ConnectionError;
use crate::handlers::MessageSink;

use framing::{ChunkSource, FrameReader};
use transport::{SocketCloser, Transport};

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Default time allowed for a graceful socket close.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(1000);

// ============================================================================
// Events
// ============================================================================

/// Notifications published by the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The state changed value
    StateChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },

    /// The receive loop failed or dropped an undecodable message
    Error(Arc<ConnectionError>),
}

/// Identity reported by the handshake for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub self_id: String,
    pub self_name: Option<String>,
    /// Number of channels the integration is a member of
    pub channel_count: usize,
    pub connected_at: DateTime<Utc>,
}

impl SessionInfo {
    fn from_handshake(response: &HandshakeResponse) -> Option<Self> {
        let info = response.self_info.as_ref()?;
        Some(Self {
            self_id: info.id.clone(),
            self_name: info.name.clone(),
            channel_count: response.channels.iter().filter(|c| c.is_member).count(),
            connected_at: Utc::now(),
        })
    }
}

// ============================================================================
// Connection Manager
// ============================================================================

/// Socket ownership, guarded by `Inner::slot`.
#[derive(Default)]
struct Slot {
    /// Bumped by every `open`; lets a finished receive loop tell whether
    /// the slot still belongs to its session
    generation: u64,
    /// Cancels the handshake in flight, or stops the receive loop
    attempt: Option<CancellationToken>,
    socket: Option<Box<dyn SocketCloser>>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    inbox: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
    slot: Mutex<Slot>,
    token: Mutex<Option<String>>,
    session: Mutex<Option<SessionInfo>>,
    disposed: AtomicBool,
    close_grace: Duration,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Moves to `next` and publishes the change.
    ///
    /// Same-value updates and illegal transitions publish nothing.
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                trace!(from = %current, to = %next, "Ignoring illegal state transition");
                return false;
            }
            let previous = std::mem::replace(current, next);
            debug!(from = %previous, to = %next, "Connection state changed");
            let _ = self.events.send(ConnectionEvent::StateChanged {
                previous,
                current: next,
            });
            true
        });
    }

    fn report(&self, error: ConnectionError) {
        warn!(error = %error, "Connection error");
        let _ = self.events.send(ConnectionEvent::Error(Arc::new(error)));
    }

    /// Hands `message` to every live message subscriber.
    fn deliver(&self, message: Message) {
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        inbox.retain(|tx| tx.send(message.clone()).is_ok());
    }

    fn set_session(&self, session: Option<SessionInfo>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }
}

/// Handle to the single real-time connection.
///
/// Cheap to clone; all clones share the same socket and state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, close_grace: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                transport,
                state,
                events,
                inbox: Mutex::new(Vec::new()),
                slot: Mutex::new(Slot::default()),
                token: Mutex::new(None),
                session: Mutex::new(None),
                disposed: AtomicBool::new(false),
                close_grace,
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.current()
    }

    /// Watches the connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribes to state changes and errors.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribes to received messages.
    ///
    /// Every message decoded after this call is queued for the returned
    /// receiver in arrival order. Nothing is dropped; dropping the
    /// receiver unsubscribes.
    pub fn messages(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Identity of the current session, if one is open.
    pub fn session(&self) -> Option<SessionInfo> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), ConnectionError> {
        if self.is_disposed() {
            Err(ConnectionError::Disposed)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Open
    // ------------------------------------------------------------------------

    /// Performs the handshake, opens the socket and starts the receive loop.
    ///
    /// On success the state is `Connected`; it becomes `Established` once
    /// the platform's greeting arrives.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Disposed` after `dispose`
    /// - `ConnectionError::InvalidState` unless the state is `Disconnected`
    /// - `ConnectionError::Protocol` if the platform rejects the credential
    /// - `ConnectionError::Transport` if the handshake or socket fails
    /// - `ConnectionError::Cancelled` if `cancel` fires or `close` is called first
    ///
    /// Every failure leaves the state `Disconnected`.
    pub async fn open(&self, token: &str, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        self.ensure_live()?;
        if cancel.is_cancelled() {
            return Err(ConnectionError::Cancelled);
        }

        let (attempt, generation) = {
            let mut slot = self.inner.slot();
            let actual = self.inner.current();
            if actual != ConnectionState::Disconnected {
                return Err(ConnectionError::InvalidState {
                    expected: ConnectionState::Disconnected,
                    actual,
                });
            }
            let attempt = cancel.child_token();
            slot.generation = slot.generation.wrapping_add(1);
            slot.attempt = Some(attempt.clone());
            self.inner.set_state(ConnectionState::Connecting);
            (attempt, slot.generation)
        };

        match self.establish(token, &attempt, generation).await {
            Ok(()) => Ok(()),
            Err(e) => {
                {
                    let mut slot = self.inner.slot();
                    if slot.generation == generation {
                        slot.attempt = None;
                    }
                }
                self.inner.set_state(ConnectionState::Disconnected);
                debug!(error = %e, "Open failed");
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        token: &str,
        attempt: &CancellationToken,
        generation: u64,
    ) -> Result<(), ConnectionError> {
        let response = tokio::select! {
            biased;
            _ = attempt.cancelled() => return Err(ConnectionError::Cancelled),
            r = self.inner.transport.handshake(token) => r?,
        };

        let session = SessionInfo::from_handshake(&response);
        let url = response.into_session_url()?;

        let (source, closer) = tokio::select! {
            biased;
            _ = attempt.cancelled() => return Err(ConnectionError::Cancelled),
            r = self.inner.transport.connect(&url) => r?,
        };

        // Either hand the socket to the slot or, if close won the race,
        // shut it down here. Token and session are recorded under the
        // slot lock so a concurrent close always clears them afterwards.
        let orphan = {
            let mut slot = self.inner.slot();
            if attempt.is_cancelled() || slot.generation != generation {
                Some(closer)
            } else {
                slot.socket = Some(closer);
                if let Some(info) = &session {
                    info!(
                        self_id = %info.self_id,
                        channels = info.channel_count,
                        "Real-time session opened"
                    );
                }
                *self.inner.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
                self.inner.set_session(session);
                self.inner.set_state(ConnectionState::Connected);
                None
            }
        };
        if let Some(mut closer) = orphan {
            let _ = tokio::time::timeout(self.inner.close_grace, closer.close()).await;
            return Err(ConnectionError::Cancelled);
        }

        let manager = self.clone();
        let stop = attempt.clone();
        tokio::spawn(async move {
            manager.receive_loop(source, stop, generation).await;
        });

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Receive Loop
    // ------------------------------------------------------------------------

    async fn receive_loop(self, source: Box<dyn ChunkSource>, stop: CancellationToken, generation: u64) {
        debug!(generation, "Receive loop started");

        let result = tokio::select! {
            r = self.pump(source) => r,
            _ = stop.cancelled() => Ok(()),
        };
        if let Err(e) = result {
            self.inner.report(e);
        }

        self.shutdown(Some(generation)).await;
        debug!(generation, "Receive loop stopped");
    }

    async fn pump(&self, source: Box<dyn ChunkSource>) -> Result<(), ConnectionError> {
        let mut frames = FrameReader::new(source);
        let mut bytes = Vec::new();

        while let Some(mut frame) = frames.next_frame().await? {
            bytes.clear();
            frame.read_to_end(&mut bytes).await?;
            if frame.is_truncated() {
                debug!(bytes = bytes.len(), "Socket closed mid-frame");
                break;
            }

            match decode_event(&bytes)? {
                RtmEvent::Hello => {
                    self.inner.set_state(ConnectionState::Established);
                    info!("Connection established");
                }
                RtmEvent::Message(raw) => match raw.into_message() {
                    Ok(message) => {
                        trace!(channel = %message.channel(), "Message received");
                        self.inner.deliver(message);
                    }
                    Err(e) => self.inner.report(e.into()),
                },
                RtmEvent::Other(kind) => {
                    trace!(kind = ?kind, "Ignoring event");
                }
            }
        }

        debug!("Socket no longer open");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Send
    // ------------------------------------------------------------------------

    /// Posts a message over the request/response channel.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Disposed` after `dispose`
    /// - `ConnectionError::InvalidState` unless the state is `Established`
    /// - `ConnectionError::Protocol` if the platform answers `ok: false`
    /// - `ConnectionError::Transport` if the request fails
    /// - `ConnectionError::Cancelled` if `cancel` fires first
    pub async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        self.ensure_live()?;

        let actual = self.inner.current();
        if !actual.can_send() {
            return Err(ConnectionError::InvalidState {
                expected: ConnectionState::Established,
                actual,
            });
        }
        let token = self
            .inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ConnectionError::InvalidState {
                expected: ConnectionState::Established,
                actual,
            })?;

        let form = OutboundForm::from_message(&message)?;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            r = self.inner.transport.post_message(&token, &form) => r?,
        };
        response.into_result().map_err(|e: ProtocolError| {
            debug!(error = %e, channel = %message.channel(), "Message rejected");
            ConnectionError::from(e)
        })
    }

    // ------------------------------------------------------------------------
    // Close / Dispose
    // ------------------------------------------------------------------------

    /// Closes the connection. Safe to call from any state and from many
    /// tasks at once; returns once the state is `Disconnected`.
    ///
    /// Cancels a handshake in flight. Errors during the graceful close are
    /// ignored.
    pub async fn close(&self) {
        self.shutdown(None).await;
    }

    /// Closes the connection and rejects every later operation.
    pub async fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.close().await;
    }

    /// Tears down the session. With `Some(generation)`, does nothing if
    /// the slot has since been claimed by a newer `open`.
    async fn shutdown(&self, generation: Option<u64>) {
        let taken = {
            let mut slot = self.inner.slot();
            if generation.is_some_and(|g| g != slot.generation) {
                return;
            }
            (slot.attempt.take(), slot.socket.take())
        };

        let (attempt, socket) = taken;
        if let Some(attempt) = attempt {
            attempt.cancel();
        }

        match socket {
            Some(mut closer) => {
                self.inner.set_state(ConnectionState::Disconnecting);
                match tokio::time::timeout(self.inner.close_grace, closer.close()).await {
                    Ok(Ok(())) => debug!("Socket closed"),
                    Ok(Err(e)) => debug!(error = %e, "Graceful close failed"),
                    Err(_) => debug!("Graceful close timed out"),
                }
                self.inner.set_session(None);
                self.inner.set_state(ConnectionState::Disconnected);
                info!("Connection closed");
            }
            None => {
                let mut state = self.inner.state.subscribe();
                let _ = state
                    .wait_for(|s| *s == ConnectionState::Disconnected)
                    .await;
            }
        }
    }
}

#[async_trait]
impl MessageSink for ConnectionManager {
    async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        ConnectionManager::send(self, message, cancel).await
    }
}
