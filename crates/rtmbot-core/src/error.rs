//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when constructing domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A field that must carry text was empty or missing
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Returns the value unchanged if it has content, otherwise an `EmptyField` error.
pub(crate) fn require_text(field: &'static str, value: String) -> DomainResult<String> {
    if value.is_empty() {
        Err(DomainError::EmptyField { field })
    } else {
        Ok(value)
    }
}
