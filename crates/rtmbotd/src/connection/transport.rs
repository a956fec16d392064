//! Network seams of the connection manager.
//!
//! `Transport` bundles the three network operations the manager needs:
//! the HTTP handshake, opening the real-time socket, and posting a
//! message over the request/response channel. `HttpTransport` is the
//! production implementation on `reqwest` and `tokio-tungstenite`;
//! tests substitute scripted transports.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use rtmbot_protocol::{ApiResponse, HandshakeResponse, OutboundForm};

use super::framing::{Chunk, ChunkSource};
use crate::error::{ConnectionError, TransportError};

/// Default base URL of the platform's HTTP API.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Reason sent with a graceful close.
const CLOSE_REASON: &str = "Closing";

// ============================================================================
// Traits
// ============================================================================

/// Sending half of a real-time socket, used only to shut it down.
#[async_trait]
pub trait SocketCloser: Send {
    /// Performs a graceful close handshake.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Network operations used by the connection manager.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Exchanges the credential for a session URL and identity.
    async fn handshake(&self, token: &str) -> Result<HandshakeResponse, ConnectionError>;

    /// Opens the real-time socket.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn ChunkSource>, Box<dyn SocketCloser>), ConnectionError>;

    /// Posts one encoded message.
    async fn post_message(
        &self,
        token: &str,
        form: &OutboundForm,
    ) -> Result<ApiResponse, ConnectionError>;
}

// ============================================================================
// HTTP + WebSocket Transport
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_base: String,
}

impl HttpTransport {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn get_text(&self, method: &str, token: &str) -> Result<String, TransportError> {
        let body = self
            .client
            .get(self.endpoint(method))
            .query(&[("token", token)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn handshake(&self, token: &str) -> Result<HandshakeResponse, ConnectionError> {
        debug!(endpoint = %self.endpoint("rtm.start"), "Requesting real-time session");
        let body = self.get_text("rtm.start", token).await?;
        Ok(HandshakeResponse::parse(&body)?)
    }

    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn ChunkSource>, Box<dyn SocketCloser>), ConnectionError> {
        let (stream, _response) = connect_async(url).await.map_err(TransportError::from)?;
        let (sink, stream) = stream.split();

        Ok((
            Box::new(WsChunkSource { stream, open: true }),
            Box::new(WsCloser { sink }),
        ))
    }

    async fn post_message(
        &self,
        token: &str,
        form: &OutboundForm,
    ) -> Result<ApiResponse, ConnectionError> {
        let body = self
            .client
            .post(self.endpoint("chat.postMessage"))
            .query(&[("token", token)])
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(form.to_body())
            .send()
            .await
            .map_err(TransportError::from)?
            .error_for_status()
            .map_err(TransportError::from)?
            .text()
            .await
            .map_err(TransportError::from)?;

        Ok(ApiResponse::parse(&body)?)
    }
}

// ============================================================================
// WebSocket Halves
// ============================================================================

/// Reading half of the socket.
///
/// The WebSocket layer already reassembles fragmented messages, so each
/// text or binary message is delivered as a single final chunk.
struct WsChunkSource {
    stream: SplitStream<WsStream>,
    open: bool,
}

#[async_trait]
impl ChunkSource for WsChunkSource {
    async fn recv_chunk(&mut self) -> Result<Chunk, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Ok(Chunk::last(text.as_bytes()));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    return Ok(Chunk::last(bytes.to_vec()));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(frame = ?frame, "Socket closed by peer");
                    self.open = false;
                    return Ok(Chunk::Close);
                }
                None => {
                    self.open = false;
                    return Ok(Chunk::Close);
                }
                Some(Ok(other)) => {
                    trace!(kind = ?other, "Skipping control frame");
                }
                Some(Err(e)) => {
                    self.open = false;
                    return Err(e.into());
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

struct WsCloser {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl SocketCloser for WsCloser {
    async fn close(&mut self) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: CLOSE_REASON.into(),
        };
        self.sink.send(WsMessage::Close(Some(frame))).await?;
        self.sink.close().await?;
        Ok(())
    }
}
