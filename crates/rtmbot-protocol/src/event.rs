//! Real-time event frames.
//!
//! Each frame is one JSON object whose `type` field names the event.
//! Only the greeting and channel messages matter to the agent; every
//! other type is surfaced as `RtmEvent::Other` so callers can ignore it.

use rtmbot_core::{Message, MessageSubtype};
use serde::Deserialize;

use crate::error::ProtocolError;
use crate::handshake::deserialize_flag;

/// A decoded real-time event.
#[derive(Debug, Clone, PartialEq)]
pub enum RtmEvent {
    /// Greeting sent once the session is ready
    Hello,

    /// A channel message
    Message(RawMessage),

    /// Any other event type, or a frame without a `type` (such as a reply ack)
    Other(Option<String>),
}

/// The `message` event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub hidden: bool,
}

impl RawMessage {
    /// Converts the wire form into a domain `Message`.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidMessage` if the channel is absent or empty.
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        let mut message = Message::new(self.channel.unwrap_or_default(), self.text.unwrap_or_default())?
            .with_subtype(MessageSubtype::from_wire(self.subtype.as_deref()))
            .with_hidden(self.hidden);
        if let Some(user) = self.user {
            message = message.with_user(user);
        }
        Ok(message)
    }
}

/// Decodes one complete frame.
///
/// # Errors
///
/// `ProtocolError::Malformed` if the bytes are not a JSON object, or if a
/// `message` event has fields of the wrong type.
pub fn decode_event(frame: &[u8]) -> Result<RtmEvent, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(frame)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    match kind.as_deref() {
        Some("hello") => Ok(RtmEvent::Hello),
        Some("message") => Ok(RtmEvent::Message(serde_json::from_value(value)?)),
        _ => Ok(RtmEvent::Other(kind)),
    }
}
