//! Built-in handlers.
//!
//! - `ping`: answers a trigger phrase, useful for checking the agent is alive
//! - `issue_link`: turns issue references such as `bug42` into linked attachments

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use rtmbot_core::{Attachment, AttachmentField, Message};

use super::{HandlerOutcome, MessageHandler, MessageSink};

/// Placeholder replaced by the issue number in `url_template`.
const ID_PLACEHOLDER: &str = "{id}";

/// Deserializes handler config, treating an absent table as empty.
fn parse_config<T: for<'de> Deserialize<'de>>(config: &serde_json::Value) -> anyhow::Result<T> {
    let value = if config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config.clone()
    };
    Ok(serde_json::from_value(value)?)
}

/// Escapes the characters that have meaning in message markup.
fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ============================================================================
// Ping
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PingConfig {
    #[serde(default = "PingConfig::default_trigger")]
    trigger: String,
    #[serde(default = "PingConfig::default_reply")]
    reply: String,
}

impl PingConfig {
    fn default_trigger() -> String {
        "!ping".to_string()
    }

    fn default_reply() -> String {
        "pong".to_string()
    }
}

/// Replies to a fixed trigger phrase.
#[derive(Debug, Clone)]
pub struct PingHandler {
    trigger: String,
    reply: String,
}

impl PingHandler {
    pub const KIND: &'static str = "ping";

    pub fn new(trigger: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            reply: reply.into(),
        }
    }

    pub fn from_config(config: &serde_json::Value) -> anyhow::Result<Self> {
        let config: PingConfig = parse_config(config)?;
        if config.trigger.trim().is_empty() {
            anyhow::bail!("ping trigger must not be empty");
        }
        Ok(Self::new(config.trigger.trim(), config.reply))
    }
}

#[async_trait]
impl MessageHandler for PingHandler {
    async fn initialize(&mut self, name: &str, _cancel: &CancellationToken) -> anyhow::Result<()> {
        debug!(handler = %name, trigger = %self.trigger, "Ping handler ready");
        Ok(())
    }

    async fn process(
        &self,
        sink: &dyn MessageSink,
        message: &Message,
        cancel: &CancellationToken,
    ) -> anyhow::Result<HandlerOutcome> {
        if message.text().trim() != self.trigger {
            return Ok(HandlerOutcome::Continue);
        }
        sink.send(message.reply(self.reply.as_str(), []), cancel).await?;
        Ok(HandlerOutcome::Complete)
    }
}

// ============================================================================
// Issue Link
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct IssueLinkConfig {
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    url_template: String,
    #[serde(default)]
    color: String,
    #[serde(default = "IssueLinkConfig::default_label")]
    label: String,
}

impl IssueLinkConfig {
    fn default_label() -> String {
        "Issue".to_string()
    }
}

/// Replies with one linked attachment per issue reference in a message.
///
/// A reference is the configured prefix immediately followed by digits,
/// matched case-insensitively (`bug42`, `BUG 42` does not match).
///
/// The prefix and URL template are checked by `initialize`; until then
/// the handler matches nothing.
#[derive(Debug, Clone)]
pub struct IssueLinkHandler {
    prefix: String,
    url_template: String,
    color: String,
    label: String,
    pattern: Option<Regex>,
}

impl IssueLinkHandler {
    pub const KIND: &'static str = "issue_link";

    pub fn from_config(config: &serde_json::Value) -> anyhow::Result<Self> {
        let config: IssueLinkConfig = parse_config(config)?;
        Ok(Self {
            prefix: config.prefix,
            url_template: config.url_template,
            color: config.color,
            label: config.label,
            pattern: None,
        })
    }

    /// Validates the settings and builds the reference pattern.
    fn compile(&mut self) -> anyhow::Result<()> {
        if self.prefix.is_empty() {
            anyhow::bail!("issue_link prefix must not be empty");
        }
        if !self.url_template.contains(ID_PLACEHOLDER) {
            anyhow::bail!("issue_link url_template must contain {ID_PLACEHOLDER}");
        }

        let starts_with_word = self
            .prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let boundary = if starts_with_word { r"\b" } else { "" };
        self.pattern = Some(Regex::new(&format!(
            r"(?i){boundary}{}(\d+)\b",
            regex::escape(&self.prefix)
        ))?);
        Ok(())
    }

    /// Issue numbers referenced in `text`, first occurrence order, no repeats.
    pub fn references(&self, text: &str) -> Vec<String> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        let mut ids: Vec<String> = Vec::new();
        for captures in pattern.captures_iter(text) {
            if let Some(id) = captures.get(1) {
                let id = id.as_str();
                if !ids.iter().any(|seen| seen == id) {
                    ids.push(id.to_string());
                }
            }
        }
        ids
    }

    fn attachment(&self, id: &str) -> anyhow::Result<Attachment> {
        let url = self.url_template.replace(ID_PLACEHOLDER, id);
        let display = format!("{} {}", self.label, id);

        Ok(Attachment::new(format!("{display}: {url}"))?
            .with_color(self.color.as_str())
            .with_text(format!("<{}|{}>", escape_markup(&url), escape_markup(&display)))
            .with_fields([AttachmentField::new(
                "Reference",
                format!("{}{}", self.prefix, id),
                true,
            )?]))
    }
}

#[async_trait]
impl MessageHandler for IssueLinkHandler {
    async fn initialize(&mut self, name: &str, _cancel: &CancellationToken) -> anyhow::Result<()> {
        self.compile()?;
        debug!(handler = %name, prefix = %self.prefix, "Issue link handler ready");
        Ok(())
    }

    async fn process(
        &self,
        sink: &dyn MessageSink,
        message: &Message,
        cancel: &CancellationToken,
    ) -> anyhow::Result<HandlerOutcome> {
        let ids = self.references(message.text());
        if ids.is_empty() {
            return Ok(HandlerOutcome::Continue);
        }

        let attachments = ids
            .iter()
            .map(|id| self.attachment(id))
            .collect::<anyhow::Result<Vec<_>>>()?;
        sink.send(message.reply("", attachments), cancel).await?;
        Ok(HandlerOutcome::Complete)
    }
}
