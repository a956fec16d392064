//! Outbound message encoding.
//!
//! Messages are posted as `application/x-www-form-urlencoded` bodies.
//! Scalar properties become individual form keys; attachments are a
//! single `attachments` key holding a JSON array. Empty optional values
//! are omitted entirely, both at the form level and inside attachments.

use rtmbot_core::{Attachment, AttachmentField, Message, MessageSubtype};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::ProtocolError;

/// Event type sent with every outbound message.
const MESSAGE_TYPE: &str = "message";

// ============================================================================
// Attachment Payloads
// ============================================================================

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldPayload {
    title: String,
    #[serde(default)]
    value: String,
    #[serde(default, rename = "short", skip_serializing_if = "is_false")]
    short: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct AttachmentPayload {
    fallback: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    color: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pretext: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    author_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    author_link: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    author_icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    title_link: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldPayload>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    image_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    thumb_url: String,
}

impl From<&Attachment> for AttachmentPayload {
    fn from(a: &Attachment) -> Self {
        Self {
            fallback: a.fallback().to_string(),
            color: a.color().to_string(),
            pretext: a.pretext().to_string(),
            author_name: a.author_name().to_string(),
            author_link: a.author_link().to_string(),
            author_icon: a.author_icon().to_string(),
            title: a.title().to_string(),
            title_link: a.title_link().to_string(),
            text: a.text().to_string(),
            fields: a
                .fields()
                .iter()
                .map(|f| FieldPayload {
                    title: f.title().to_string(),
                    value: f.value().to_string(),
                    short: f.is_short(),
                })
                .collect(),
            image_url: a.image_url().to_string(),
            thumb_url: a.thumb_url().to_string(),
        }
    }
}

impl AttachmentPayload {
    fn into_attachment(self) -> Result<Attachment, ProtocolError> {
        let fields = self
            .fields
            .into_iter()
            .map(|f| AttachmentField::new(f.title, f.value, f.short))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Attachment::new(self.fallback)?
            .with_color(self.color)
            .with_pretext(self.pretext)
            .with_author(self.author_name, self.author_link, self.author_icon)
            .with_title(self.title, self.title_link)
            .with_text(self.text)
            .with_image_url(self.image_url)
            .with_thumb_url(self.thumb_url)
            .with_fields(fields))
    }
}

// ============================================================================
// Outbound Form
// ============================================================================

/// Ordered form fields for posting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundForm {
    pairs: Vec<(String, String)>,
}

impl OutboundForm {
    /// Encodes a message.
    ///
    /// # Errors
    ///
    /// `ProtocolError::Malformed` if the attachments cannot be serialized.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        let mut pairs = vec![
            ("channel".to_string(), message.channel().to_string()),
            ("type".to_string(), MESSAGE_TYPE.to_string()),
            ("text".to_string(), message.text().to_string()),
        ];

        if let Some(user) = message.user() {
            pairs.push(("user".to_string(), user.to_string()));
        }
        if let Some(subtype) = message.subtype().as_wire() {
            pairs.push(("subtype".to_string(), subtype.to_string()));
        }
        if message.is_hidden() {
            pairs.push(("hidden".to_string(), "true".to_string()));
        }
        if !message.attachments().is_empty() {
            let payloads: Vec<AttachmentPayload> =
                message.attachments().iter().map(AttachmentPayload::from).collect();
            pairs.push(("attachments".to_string(), serde_json::to_string(&payloads)?));
        }

        Ok(Self { pairs })
    }

    /// Parses a form-encoded body.
    pub fn parse(body: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(body.as_bytes()).into_owned().collect(),
        }
    }

    /// Returns the value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Renders the `application/x-www-form-urlencoded` body.
    pub fn to_body(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    /// Decodes the form back into a message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MissingField` if `channel` is absent
    /// - `ProtocolError::Malformed` if `attachments` is not a JSON array of attachments
    /// - `ProtocolError::InvalidMessage` if a decoded value is empty where text is required
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        let channel = self.get("channel").ok_or(ProtocolError::MissingField("channel"))?;
        let mut message = Message::new(channel, self.get("text").unwrap_or_default())?
            .with_subtype(MessageSubtype::from_wire(self.get("subtype")))
            .with_hidden(self.get("hidden") == Some("true"));

        if let Some(user) = self.get("user") {
            message = message.with_user(user);
        }
        if let Some(raw) = self.get("attachments") {
            let payloads: Vec<AttachmentPayload> = serde_json::from_str(raw)?;
            let attachments = payloads
                .into_iter()
                .map(AttachmentPayload::into_attachment)
                .collect::<Result<Vec<_>, _>>()?;
            message = message.with_attachments(attachments);
        }

        Ok(message)
    }
}
