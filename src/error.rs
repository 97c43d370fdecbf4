//! Error types for the weather cache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Result type returned by data providers
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur in the weather cache
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied a malformed or out-of-range coordinate
    #[error("Invalid {field} value: {reason}")]
    InvalidCoordinate { field: &'static str, reason: String },

    /// The data provider failed; surfaced to the caller verbatim
    #[error("Provider request failed: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// Background sweeper already started for this cache instance
    #[error("Eviction sweeper is already running")]
    AlreadyRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error was caused by the caller's input
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidCoordinate { .. })
    }
}

/// Failures reported by the external data provider.
///
/// Cloneable so a single fetch outcome can be handed to every caller that
/// joined the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport-level failure (DNS, connect, reset)
    #[error("connection error: {0}")]
    Connection(String),

    /// Provider answered with a non-success HTTP status
    #[error("unexpected status {status}")]
    Status { status: u16 },

    /// Provider response could not be decoded
    #[error("malformed response: {0}")]
    Parse(String),

    /// Provider did not answer within the configured bound
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Provider answered successfully but without usable data
    #[error("empty payload")]
    EmptyPayload,

    /// The background fetch task panicked or was aborted
    #[error("fetch task ended abnormally: {0}")]
    Interrupted(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Connection(_) | ProviderError::Timeout(_) => true,
            ProviderError::Status { status } => *status == 429 || *status >= 500,
            ProviderError::Parse(_)
            | ProviderError::EmptyPayload
            | ProviderError::Interrupted(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Status {
                status: status.as_u16(),
            }
        } else {
            ProviderError::Connection(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Connection("reset".into()).is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::Status { status: 503 }.is_retryable());
        assert!(ProviderError::Status { status: 429 }.is_retryable());

        assert!(!ProviderError::Status { status: 401 }.is_retryable());
        assert!(!ProviderError::Status { status: 404 }.is_retryable());
        assert!(!ProviderError::Parse("bad json".into()).is_retryable());
        assert!(!ProviderError::EmptyPayload.is_retryable());
        assert!(!ProviderError::Interrupted("panicked".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_wraps_verbatim() {
        let err: Error = ProviderError::Status { status: 502 }.into();
        assert_eq!(
            err.to_string(),
            "Provider request failed: unexpected status 502"
        );
        assert!(!err.is_validation());
    }

    #[test]
    fn test_invalid_coordinate_display() {
        let err = Error::InvalidCoordinate {
            field: "latitude",
            reason: "91 is outside [-90, 90]".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid latitude value: 91 is outside [-90, 90]"
        );
        assert!(err.is_validation());
    }
}
