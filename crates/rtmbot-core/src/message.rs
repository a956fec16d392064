//! Channel messages.

use crate::attachment::Attachment;
use crate::error::{require_text, DomainResult};
use crate::subtype::MessageSubtype;

/// A chat message, either received from a channel or built as a reply.
///
/// Immutable once constructed. Inbound messages are built by the protocol
/// decoder; outbound ones by handlers, usually through [`Message::reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    channel: String,
    user: Option<String>,
    text: String,
    subtype: MessageSubtype,
    hidden: bool,
    attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a plain message for a channel.
    ///
    /// # Errors
    ///
    /// `DomainError::EmptyField` if `channel` is empty.
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> DomainResult<Self> {
        Ok(Self {
            channel: require_text("channel", channel.into())?,
            user: None,
            text: text.into(),
            subtype: MessageSubtype::Message,
            hidden: false,
            attachments: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_subtype(mut self, subtype: MessageSubtype) -> Self {
        self.subtype = subtype;
        self
    }

    #[must_use]
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Appends attachments, keeping their order.
    #[must_use]
    pub fn with_attachments(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    /// Builds a reply to this message: same channel, default subtype,
    /// no user and not hidden.
    pub fn reply(&self, text: impl Into<String>, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        Self {
            channel: self.channel.clone(),
            user: None,
            text: text.into(),
            subtype: MessageSubtype::Message,
            hidden: false,
            attachments: attachments.into_iter().collect(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn subtype(&self) -> &MessageSubtype {
        &self.subtype
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}
