//! Shared primitives for all Rust crates in jobguard.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across jobguard crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Error categories shared by the gate, the admitter and their adapters.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// The execution directory could not be queried.
    #[error("execution directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The directory call succeeded but carried no result list at all.
    #[error("execution directory returned no result list for job '{0}'")]
    EmptyDirectoryResponse(String),

    /// The asking instance is missing from its own directory snapshot.
    #[error("current instance '{identity}' was not found among running instances of job '{job_id}'")]
    SelfNotFound {
        /// Job whose directory was queried.
        job_id: String,
        /// Identity of the instance that asked.
        identity: String,
    },

    /// A consistency check over a snapshot or decision failed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The admission queue could not be reached.
    #[error("admission queue unavailable: {0}")]
    QueueUnavailable(String),

    /// The launch idempotency name is already held by a running instance.
    #[error("launch rejected: {0}")]
    LaunchRejected(String),

    /// The job launcher could not be reached.
    #[error("job launcher unavailable: {0}")]
    LauncherUnavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the failure came from a transport that may recover on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DirectoryUnavailable(_) | Self::QueueUnavailable(_) | Self::LauncherUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_string_deserializes_through_validation() {
        let parsed: Result<NonEmptyString, _> = serde_json::from_str("\"  \"");
        assert!(parsed.is_err());

        let parsed: Result<NonEmptyString, _> = serde_json::from_str("\"job-a\"");
        assert!(parsed.is_ok_and(|value| value.as_str() == "job-a"));
    }

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(AppError::DirectoryUnavailable("timeout".to_owned()).is_transient());
        assert!(AppError::QueueUnavailable("timeout".to_owned()).is_transient());
        assert!(AppError::LauncherUnavailable("timeout".to_owned()).is_transient());
        assert!(!AppError::EmptyDirectoryResponse("job".to_owned()).is_transient());
        assert!(!AppError::InvariantViolation("tie".to_owned()).is_transient());
        assert!(
            !AppError::SelfNotFound {
                job_id: "job".to_owned(),
                identity: "x".to_owned(),
            }
            .is_transient()
        );
    }
}
