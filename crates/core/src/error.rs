//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, caller-visible failures (validation and
/// conflicts). Transport and background failures have their own types in the
/// infrastructure crates. "Not found" is deliberately absent: an unknown
/// country is an answer, not a failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input is not a two-letter alphabetic country code.
    #[error("invalid country code: {0:?}")]
    InvalidCode(String),

    /// Display name is empty or too long.
    #[error("invalid country name: {0}")]
    InvalidName(String),

    /// Temporary block duration outside (0, 1440] minutes.
    #[error("duration must be between 1 and 1440 minutes (got {0})")]
    InvalidDuration(i64),

    /// The country is already blocked.
    #[error("country {0} is already blocked")]
    DuplicateBlock(String),
}

impl DomainError {
    pub fn invalid_code(input: impl Into<String>) -> Self {
        Self::InvalidCode(input.into())
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }

    pub fn duplicate_block(code: impl Into<String>) -> Self {
        Self::DuplicateBlock(code.into())
    }

    /// Whether the failure was caused by malformed caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCode(_) | Self::InvalidName(_) | Self::InvalidDuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_classified() {
        assert!(DomainError::invalid_code("USA").is_validation());
        assert!(DomainError::invalid_name("empty").is_validation());
        assert!(DomainError::InvalidDuration(0).is_validation());
        assert!(!DomainError::duplicate_block("US").is_validation());
    }

    #[test]
    fn messages_name_the_offending_input() {
        assert_eq!(
            DomainError::invalid_code("U1").to_string(),
            "invalid country code: \"U1\""
        );
        assert_eq!(
            DomainError::duplicate_block("US").to_string(),
            "country US is already blocked"
        );
    }
}
