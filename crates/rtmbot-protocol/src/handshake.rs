//! Handshake and API response envelopes.
//!
//! Every platform HTTP response shares an `{ok, error}` envelope. The
//! handshake adds the one-time WebSocket URL and the identity of the
//! authenticated integration.

use serde::{Deserialize, Deserializer};

use crate::error::ProtocolError;

/// Response to the real-time session handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeResponse {
    #[serde(deserialize_with = "deserialize_flag")]
    pub ok: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "self")]
    pub self_info: Option<SelfInfo>,
    #[serde(default)]
    pub channels: Vec<ChannelSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Identity of the integration the token belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct SelfInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_member: bool,
}

impl HandshakeResponse {
    /// Parses a handshake body.
    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Returns the socket URL, or the mapped rejection if `ok` is false.
    pub fn into_session_url(self) -> Result<String, ProtocolError> {
        if !self.ok {
            return Err(ProtocolError::rejected(self.error.as_deref()));
        }
        self.url.ok_or(ProtocolError::MissingField("url"))
    }
}

/// Envelope returned by non-handshake API calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    #[serde(deserialize_with = "deserialize_flag")]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Converts `ok == false` into the mapped `ProtocolError::Rejected`.
    pub fn into_result(self) -> Result<(), ProtocolError> {
        if self.ok {
            Ok(())
        } else {
            Err(ProtocolError::rejected(self.error.as_deref()))
        }
    }
}

/// Accepts a JSON boolean or the strings `"true"` / `"false"`.
pub(crate) fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => Ok(s.eq_ignore_ascii_case("true")),
    }
}
