//! Rich message attachments.
//!
//! Both types are immutable once built: construction validates the
//! required text, and the `with_*` builders consume and return `self`.

use crate::error::{require_text, DomainResult};

// ============================================================================
// Attachment Field
// ============================================================================

/// A titled value rendered in a table inside an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentField {
    title: String,
    value: String,
    short: bool,
}

impl AttachmentField {
    /// Creates a field.
    ///
    /// # Errors
    ///
    /// `DomainError::EmptyField` if `title` is empty.
    pub fn new(title: impl Into<String>, value: impl Into<String>, short: bool) -> DomainResult<Self> {
        Ok(Self {
            title: require_text("title", title.into())?,
            value: value.into(),
            short,
        })
    }

    /// Bold heading shown above the value.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the field is narrow enough to sit beside other fields.
    pub fn is_short(&self) -> bool {
        self.short
    }
}

// ============================================================================
// Attachment
// ============================================================================

/// A formatted block attached to a message.
///
/// Only `fallback` is required; every other text property defaults to
/// the empty string, which the wire encoding treats as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    fallback: String,
    color: String,
    pretext: String,
    author_name: String,
    author_link: String,
    author_icon: String,
    title: String,
    title_link: String,
    text: String,
    image_url: String,
    thumb_url: String,
    fields: Vec<AttachmentField>,
}

impl Attachment {
    /// Creates an attachment with the plain-text summary shown by clients
    /// that cannot render attachments.
    ///
    /// # Errors
    ///
    /// `DomainError::EmptyField` if `fallback` is empty.
    pub fn new(fallback: impl Into<String>) -> DomainResult<Self> {
        Ok(Self {
            fallback: require_text("fallback", fallback.into())?,
            color: String::new(),
            pretext: String::new(),
            author_name: String::new(),
            author_link: String::new(),
            author_icon: String::new(),
            title: String::new(),
            title_link: String::new(),
            text: String::new(),
            image_url: String::new(),
            thumb_url: String::new(),
            fields: Vec::new(),
        })
    }

    /// Sets the color of the left border (e.g. `#F35A00` or `good`).
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Sets the text shown above the attachment block.
    #[must_use]
    pub fn with_pretext(mut self, pretext: impl Into<String>) -> Self {
        self.pretext = pretext.into();
        self
    }

    /// Sets the author name, link and icon.
    #[must_use]
    pub fn with_author(
        mut self,
        name: impl Into<String>,
        link: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        self.author_name = name.into();
        self.author_link = link.into();
        self.author_icon = icon.into();
        self
    }

    /// Sets the bold title and the URL it links to.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>, link: impl Into<String>) -> Self {
        self.title = title.into();
        self.title_link = link.into();
        self
    }

    /// Sets the main body text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = url.into();
        self
    }

    #[must_use]
    pub fn with_thumb_url(mut self, url: impl Into<String>) -> Self {
        self.thumb_url = url.into();
        self
    }

    /// Appends fields, keeping their order.
    #[must_use]
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = AttachmentField>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn pretext(&self) -> &str {
        &self.pretext
    }

    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    pub fn author_link(&self) -> &str {
        &self.author_link
    }

    pub fn author_icon(&self) -> &str {
        &self.author_icon
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn title_link(&self) -> &str {
        &self.title_link
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn thumb_url(&self) -> &str {
        &self.thumb_url
    }

    pub fn fields(&self) -> &[AttachmentField] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DomainError;

    #[test]
    fn test_field_requires_title() {
        assert_eq!(
            AttachmentField::new("", "value", false),
            Err(DomainError::EmptyField { field: "title" })
        );
    }

    #[test]
    fn test_field_accessors() {
        let field = AttachmentField::new("State", "Active", true).unwrap();
        assert_eq!(field.title(), "State");
        assert_eq!(field.value(), "Active");
        assert!(field.is_short());
    }

    #[test]
    fn test_field_value_may_be_empty() {
        let field = AttachmentField::new("Assigned To", "", false).unwrap();
        assert_eq!(field.value(), "");
        assert!(!field.is_short());
    }

    #[test]
    fn test_attachment_requires_fallback() {
        assert_eq!(
            Attachment::new(""),
            Err(DomainError::EmptyField { field: "fallback" })
        );
    }

    #[test]
    fn test_attachment_defaults_are_empty() {
        let attachment = Attachment::new("summary").unwrap();
        assert_eq!(attachment.fallback(), "summary");
        assert_eq!(attachment.color(), "");
        assert_eq!(attachment.title(), "");
        assert!(attachment.fields().is_empty());
    }

    #[test]
    fn test_attachment_builder() {
        let attachment = Attachment::new("Bug 42")
            .unwrap()
            .with_color("#F35A00")
            .with_pretext("Found one")
            .with_author("Ada", "https://example.com/ada", "https://example.com/ada.png")
            .with_title("Crash on start", "https://example.com/42")
            .with_text("Stack trace attached")
            .with_image_url("https://example.com/i.png")
            .with_thumb_url("https://example.com/t.png")
            .with_fields([
                AttachmentField::new("State", "Active", true).unwrap(),
                AttachmentField::new("Owner", "Ada", true).unwrap(),
            ]);

        assert_eq!(attachment.color(), "#F35A00");
        assert_eq!(attachment.pretext(), "Found one");
        assert_eq!(attachment.author_name(), "Ada");
        assert_eq!(attachment.author_link(), "https://example.com/ada");
        assert_eq!(attachment.author_icon(), "https://example.com/ada.png");
        assert_eq!(attachment.title_link(), "https://example.com/42");
        assert_eq!(attachment.text(), "Stack trace attached");
        assert_eq!(attachment.image_url(), "https://example.com/i.png");
        assert_eq!(attachment.thumb_url(), "https://example.com/t.png");
        let titles: Vec<_> = attachment.fields().iter().map(|f| f.title()).collect();
        assert_eq!(titles, vec!["State", "Owner"]);
    }
}
