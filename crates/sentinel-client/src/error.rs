//! Client error types

use thiserror::Error;

/// Errors surfaced by sentinel-backed connections
///
/// Callers see either a normal result, the original fatal error unchanged,
/// or [`ClientError::RetryLimitExceeded`] wrapping the last retryable
/// failure after the configured attempts ran out. Intermediate per-attempt
/// failures are never surfaced on their own.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Missing or invalid static configuration (never retried)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Error reported by the backend or sentinel client
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    /// No sentinel endpoint could name a master for the service
    #[error("no master found for service '{0}'")]
    NoMasterFound(String),

    /// Structurally unexpected reply from the backend or a sentinel
    #[error("unexpected reply from server: {0}")]
    UnexpectedReply(String),

    /// Retry budget exhausted; the last retryable failure is the source
    #[error("reached the (re)connect limit of {attempts} attempts")]
    RetryLimitExceeded {
        /// Total attempts made, including the first
        attempts: u32,
        /// The last classified failure before giving up
        #[source]
        source: Box<ClientError>,
    },
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
