//! Platform error codes and protocol errors.

use rtmbot_core::DomainError;
use std::fmt;
use thiserror::Error;

/// Error codes returned by the platform in the `error` field of a
/// failed (`ok == false`) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No authentication token was provided
    NotAuthenticated,
    /// The authentication token is invalid
    InvalidAuthentication,
    /// The integration is not a member of the channel
    NotInChannel,
    /// The channel has been archived
    ChannelArchived,
    /// The message text is too long
    MessageTooLong,
    /// No message text was provided
    NoText,
    /// The token belongs to a deleted user or integration
    AccountInactive,
    /// Too many messages posted; retrying later may succeed
    RateLimited,
    /// Any code this crate does not recognize
    Unknown,
}

impl ErrorCode {
    /// Maps the platform's error string to a code.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "not_authed" => Self::NotAuthenticated,
            "invalid_auth" => Self::InvalidAuthentication,
            "not_in_channel" => Self::NotInChannel,
            "is_archived" => Self::ChannelArchived,
            "msg_too_long" => Self::MessageTooLong,
            "no_text" => Self::NoText,
            "account_inactive" => Self::AccountInactive,
            "rate_limited" => Self::RateLimited,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the failure is expected to clear on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotAuthenticated => "not authenticated",
            Self::InvalidAuthentication => "invalid authentication",
            Self::NotInChannel => "not in channel",
            Self::ChannelArchived => "channel archived",
            Self::MessageTooLong => "message too long",
            Self::NoText => "no text",
            Self::AccountInactive => "account inactive",
            Self::RateLimited => "rate limited",
            Self::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// Errors at the platform serialization boundary.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The platform answered `ok: false`
    #[error("Platform rejected request: {code} ({raw})")]
    Rejected {
        code: ErrorCode,
        /// The error string as sent by the platform
        raw: String,
    },

    /// A required field was absent from a response or frame
    #[error("Missing field in platform response: {0}")]
    MissingField(&'static str),

    /// The payload was not valid JSON, or not the expected shape
    #[error("Malformed platform payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A decoded value violated a domain invariant
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] DomainError),
}

impl ProtocolError {
    /// Builds a `Rejected` error from the platform's `error` field.
    pub fn rejected(raw: Option<&str>) -> Self {
        let raw = raw.unwrap_or_default();
        Self::Rejected {
            code: ErrorCode::from_wire(raw),
            raw: raw.to_string(),
        }
    }

    /// Returns the mapped platform code, if this is a rejection.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let cases = [
            ("not_authed", ErrorCode::NotAuthenticated),
            ("invalid_auth", ErrorCode::InvalidAuthentication),
            ("not_in_channel", ErrorCode::NotInChannel),
            ("is_archived", ErrorCode::ChannelArchived),
            ("msg_too_long", ErrorCode::MessageTooLong),
            ("no_text", ErrorCode::NoText),
            ("account_inactive", ErrorCode::AccountInactive),
            ("rate_limited", ErrorCode::RateLimited),
            ("channel_not_found", ErrorCode::Unknown),
            ("", ErrorCode::Unknown),
        ];
        for (wire, expected) in cases {
            assert_eq!(ErrorCode::from_wire(wire), expected, "mapping {wire}");
        }
    }

    #[test]
    fn test_only_rate_limited_is_transient() {
        assert!(ErrorCode::RateLimited.is_transient());
        assert!(!ErrorCode::InvalidAuthentication.is_transient());
        assert!(!ErrorCode::Unknown.is_transient());
    }

    #[test]
    fn test_rejected_keeps_raw_string() {
        let error = ProtocolError::rejected(Some("rate_limited"));
        assert_eq!(error.code(), Some(ErrorCode::RateLimited));
        let display = error.to_string();
        assert!(display.contains("rate limited"));
        assert!(display.contains("rate_limited"));
    }

    #[test]
    fn test_rejected_without_error_field() {
        let error = ProtocolError::rejected(None);
        assert_eq!(error.code(), Some(ErrorCode::Unknown));
    }

    #[test]
    fn test_non_rejection_has_no_code() {
        assert_eq!(ProtocolError::MissingField("url").code(), None);
    }

    #[test]
    fn test_malformed_from_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let error: ProtocolError = json_error.into();
        assert!(matches!(error, ProtocolError::Malformed(_)));
    }
}
