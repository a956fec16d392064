//! Agent configuration.
//!
//! Loaded once from a TOML file and passed to the components that need
//! it. Example:
//!
//! ```toml
//! token = "xoxb-..."
//! reconnect_delay_ms = 5000
//!
//! [[handlers]]
//! name = "ping"
//! kind = "ping"
//!
//! [[handlers]]
//! name = "bugs"
//! kind = "issue_link"
//! config = { prefix = "bug", url_template = "https://tracker.example.com/{id}" }
//! ```
//!
//! The token may instead come from the `RTMBOT_TOKEN` environment
//! variable, which takes precedence over the file.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::connection::transport::DEFAULT_API_BASE;

/// Environment variable overriding the token.
pub const TOKEN_ENV: &str = "RTMBOT_TOKEN";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "RTMBOT_CONFIG";

/// Default delay before reconnecting after a disconnect.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Default grace period for a graceful socket close.
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 1000;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no token configured (set `token` or RTMBOT_TOKEN)")]
    EmptyToken,

    #[error("handler #{index} has an empty name")]
    EmptyHandlerName { index: usize },

    #[error("duplicate handler name: {0}")]
    DuplicateHandlerName(String),

    #[error("handler '{name}' has an empty kind")]
    EmptyKind { name: String },

    #[error("reconnect_delay_ms must be greater than zero")]
    ZeroReconnectDelay,

    #[error("could not determine the config directory")]
    NoConfigDir,
}

/// One entry of the ordered handler list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandlerDescriptor {
    /// Unique name, used in logs and passed to `initialize`
    pub name: String,
    /// Registry key selecting the implementation
    pub kind: String,
    /// Opaque settings handed to the handler's factory
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Top-level configuration.
#[derive(Clone, PartialEq, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "BotConfig::default_api_base")]
    pub api_base: String,
    #[serde(default = "BotConfig::default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "BotConfig::default_close_grace_ms")]
    pub close_grace_ms: u64,
    #[serde(default)]
    pub handlers: Vec<HandlerDescriptor>,
}

impl BotConfig {
    fn default_api_base() -> String {
        DEFAULT_API_BASE.to_string()
    }

    fn default_reconnect_delay_ms() -> u64 {
        DEFAULT_RECONNECT_DELAY_MS
    }

    fn default_close_grace_ms() -> u64 {
        DEFAULT_CLOSE_GRACE_MS
    }

    /// Creates a config with defaults for everything but the token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: Self::default_api_base(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
            handlers: Vec::new(),
        }
    }

    /// Reads, applies the environment override and validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_token_override(std::env::var(TOKEN_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML without validating.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Replaces the token with `token` when it is set and non-empty.
    pub fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = token;
        }
    }

    /// Checks the token, the reconnect delay and the handler list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::ZeroReconnectDelay);
        }

        let mut seen = HashSet::new();
        for (index, handler) in self.handlers.iter().enumerate() {
            if handler.name.trim().is_empty() {
                return Err(ConfigError::EmptyHandlerName { index });
            }
            if handler.kind.trim().is_empty() {
                return Err(ConfigError::EmptyKind {
                    name: handler.name.clone(),
                });
            }
            if !seen.insert(handler.name.as_str()) {
                return Err(ConfigError::DuplicateHandlerName(handler.name.clone()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_handler(mut self, descriptor: HandlerDescriptor) -> Self {
        self.handlers.push(descriptor);
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("close_grace_ms", &self.close_grace_ms)
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Location of the config file: `$RTMBOT_CONFIG`, else
/// `<config dir>/rtmbot/config.toml`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("rtmbot").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        token = "xoxb-test"
        reconnect_delay_ms = 2000

        [[handlers]]
        name = "ping"
        kind = "ping"

        [[handlers]]
        name = "bugs"
        kind = "issue_link"
        config = { prefix = "bug", url_template = "https://x/{id}" }
    "#;

    #[test]
    fn test_parse_with_defaults() {
        let config = BotConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.token, "xoxb-test");
        assert_eq!(config.api_base, "https://slack.com/api");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.close_grace(), Duration::from_millis(1000));

        let names: Vec<&str> = config.handlers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["ping", "bugs"]);
        assert!(config.handlers[0].config.is_null());
        assert_eq!(config.handlers[1].config["prefix"], "bug");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = BotConfig::load(file.path()).unwrap();
        assert_eq!(config.handlers.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BotConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            BotConfig::from_toml_str("token = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_token_override() {
        let mut config = BotConfig::from_toml_str("").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyToken)));

        config.apply_token_override(Some("   ".to_string()));
        assert!(matches!(config.validate(), Err(ConfigError::EmptyToken)));

        config.apply_token_override(Some("xoxb-env".to_string()));
        assert_eq!(config.token, "xoxb-env");
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let descriptor = |name: &str, kind: &str| HandlerDescriptor {
            name: name.to_string(),
            kind: kind.to_string(),
            config: serde_json::Value::Null,
        };

        let config = BotConfig::new("t").with_handler(descriptor("", "ping"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyHandlerName { index: 0 })
        ));

        let config = BotConfig::new("t").with_handler(descriptor("a", " "));
        assert!(matches!(config.validate(), Err(ConfigError::EmptyKind { .. })));

        let config = BotConfig::new("t")
            .with_handler(descriptor("a", "ping"))
            .with_handler(descriptor("a", "issue_link"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateHandlerName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_reconnect_delay_keeps_milliseconds() {
        let config = BotConfig::new("t").with_reconnect_delay(Duration::from_millis(250));
        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
        config.validate().unwrap();

        let config = BotConfig::from_toml_str("token = \"t\"").unwrap();
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_reconnect_delay_rejected() {
        let config = BotConfig::new("t").with_reconnect_delay(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroReconnectDelay)));

        let config = BotConfig::from_toml_str("token = \"t\"\nreconnect_delay_ms = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ZeroReconnectDelay)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", BotConfig::new("xoxb-secret"));
        assert!(!rendered.contains("xoxb-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
