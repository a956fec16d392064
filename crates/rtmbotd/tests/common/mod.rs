//! Shared fixtures for the integration tests.
//!
//! `MockTransport` scripts handshakes, hands out sockets whose chunks the
//! test feeds by hand, and records every call.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Instant};

use rtmbot_core::ConnectionState;
use rtmbot_protocol::{ApiResponse, HandshakeResponse, OutboundForm};
use rtmbotd::connection::framing::{Chunk, ChunkSource};
use rtmbotd::{ConnectionError, ConnectionEvent, ConnectionManager, SocketCloser, Transport, TransportError};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on any single wait in a test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub const HELLO: &str = r#"{"type":"hello"}"#;

// ============================================================================
// Mock Transport
// ============================================================================

/// Scripted outcome of one handshake.
#[derive(Debug, Clone)]
pub enum Handshake {
    Accept,
    Reject(&'static str),
}

#[derive(Default)]
pub struct MockTransport {
    handshakes: Mutex<VecDeque<Handshake>>,
    handshake_delay: Mutex<Option<Duration>>,
    handshake_times: Mutex<Vec<Instant>>,
    connects: AtomicUsize,
    sockets: Mutex<Vec<mpsc::UnboundedSender<Chunk>>>,
    close_calls: Arc<AtomicUsize>,
    close_delay: Arc<Mutex<Duration>>,
    posted: Mutex<Vec<OutboundForm>>,
    post_errors: Mutex<VecDeque<&'static str>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues handshake outcomes; once exhausted every handshake is accepted.
    pub fn script_handshakes(&self, outcomes: impl IntoIterator<Item = Handshake>) {
        self.handshakes.lock().unwrap().extend(outcomes);
    }

    pub fn set_handshake_delay(&self, delay: Duration) {
        *self.handshake_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock().unwrap() = delay;
    }

    /// Makes the next post answer `ok: false` with `code`.
    pub fn fail_next_post(&self, code: &'static str) {
        self.post_errors.lock().unwrap().push_back(code);
    }

    pub fn handshake_calls(&self) -> usize {
        self.handshake_times.lock().unwrap().len()
    }

    pub fn handshake_times(&self) -> Vec<Instant> {
        self.handshake_times.lock().unwrap().clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<OutboundForm> {
        self.posted.lock().unwrap().clone()
    }

    /// Feeds a chunk to the most recently opened socket.
    pub fn feed(&self, chunk: Chunk) {
        let sockets = self.sockets.lock().unwrap();
        sockets
            .last()
            .expect("no socket opened")
            .send(chunk)
            .expect("socket reader gone");
    }

    /// Feeds one complete text frame.
    pub fn feed_frame(&self, json: &str) {
        self.feed(Chunk::last(json.as_bytes()));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn handshake(&self, _token: &str) -> Result<HandshakeResponse, ConnectionError> {
        self.handshake_times.lock().unwrap().push(Instant::now());
        let delay = *self.handshake_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .handshakes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Handshake::Accept);
        let body = match outcome {
            Handshake::Accept => r#"{
                "ok": true,
                "url": "wss://mock.invalid/socket",
                "self": {"id": "UBOT", "name": "rtmbot"},
                "channels": [{"id": "C1", "is_member": true}, {"id": "C2", "is_member": false}]
            }"#
            .to_string(),
            Handshake::Reject(code) => format!(r#"{{"ok": "false", "error": "{code}"}}"#),
        };
        Ok(HandshakeResponse::parse(&body)?)
    }

    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Box<dyn ChunkSource>, Box<dyn SocketCloser>), ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.lock().unwrap().push(tx);

        Ok((
            Box::new(MockSource { rx, open: true }),
            Box::new(MockCloser {
                calls: Arc::clone(&self.close_calls),
                delay: Arc::clone(&self.close_delay),
            }),
        ))
    }

    async fn post_message(
        &self,
        _token: &str,
        form: &OutboundForm,
    ) -> Result<ApiResponse, ConnectionError> {
        self.posted.lock().unwrap().push(form.clone());
        let body = match self.post_errors.lock().unwrap().pop_front() {
            Some(code) => format!(r#"{{"ok": false, "error": "{code}"}}"#),
            None => r#"{"ok": true}"#.to_string(),
        };
        Ok(ApiResponse::parse(&body)?)
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<Chunk>,
    open: bool,
}

#[async_trait]
impl ChunkSource for MockSource {
    async fn recv_chunk(&mut self) -> Result<Chunk, TransportError> {
        match self.rx.recv().await {
            Some(Chunk::Close) | None => {
                self.open = false;
                Ok(Chunk::Close)
            }
            Some(chunk) => Ok(chunk),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

struct MockCloser {
    calls: Arc<AtomicUsize>,
    delay: Arc<Mutex<Duration>>,
}

#[async_trait]
impl SocketCloser for MockCloser {
    async fn close(&mut self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

// ============================================================================
// Waiting Helpers
// ============================================================================

/// Waits until the connection reaches `state`.
pub async fn wait_for_state(connection: &ConnectionManager, state: ConnectionState) {
    let mut rx = connection.watch_state();
    timeout(WAIT_TIMEOUT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .expect("state channel closed");
}

/// Polls `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Receives the next event matching `select`, skipping others.
pub async fn next_event<T>(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
    mut select: impl FnMut(ConnectionEvent) -> Option<T>,
) -> T {
    timeout(WAIT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if let Some(value) = select(event) {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Receives the next state change as `(previous, current)`.
pub async fn next_state_change(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
) -> (ConnectionState, ConnectionState) {
    next_event(rx, |event| match event {
        ConnectionEvent::StateChanged { previous, current } => Some((previous, current)),
        _ => None,
    })
    .await
}

/// Runs `future` with the standard timeout.
pub async fn within<F: Future>(future: F) -> F::Output {
    timeout(WAIT_TIMEOUT, future).await.expect("timed out")
}

/// Opens `connection` and drives it to `Established`.
pub async fn establish(connection: &ConnectionManager, transport: &MockTransport) {
    connection
        .open("xoxb-test", &tokio_util::sync::CancellationToken::new())
        .await
        .expect("open should succeed");
    transport.feed_frame(HELLO);
    wait_for_state(connection, ConnectionState::Established).await;
}
