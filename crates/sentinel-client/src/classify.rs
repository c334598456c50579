//! Failure classification
//!
//! Maps any [`ClientError`] to one of three categories that drive the retry
//! loop: retryable unavailability, retryable name-resolution trouble, or
//! fatal. The backend's failure surface during a failover includes both
//! explicit read-only errors (the old master was demoted) and low-level
//! socket errors (the old master was terminated); both must land in the
//! same recovery path, hence the whitelist of message fragments below.

use crate::error::ClientError;

/// Message fragments that indicate the backend went away or is otherwise
/// temporarily unavailable. Matched case-insensitively as substrings.
const UNAVAILABILITY_MARKERS: &[&str] = &[
    "connection closed",
    "connection refused",
    "connection lost",
    "failed while reconnecting",
    "is loading the dataset in memory",
    "failed to lookup address",
    "read error on connection",
    "socket",
    "went away",
    "loading",
    "readonly",
    "can't write against a read only replica",
];

/// Message fragments that indicate a name-resolution problem.
const NAME_RESOLUTION_MARKERS: &[&str] = &["getaddrinfo", "name or service not known"];

/// Classification of a failure
///
/// `Unavailable` and `NameResolution` are treated identically by the retry
/// engine (both trigger retry plus reconnect); the distinction only matters
/// for diagnostics and for the reconnect path, which swallows
/// name-resolution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Backend temporarily unavailable; retry after reconnecting
    Unavailable,
    /// Host name could not be resolved; retry after reconnecting
    NameResolution,
    /// Anything unrecognized; propagated immediately, never retried
    Fatal,
}

impl ErrorClass {
    /// Whether this class should drive a retry-plus-reconnect cycle
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

/// Classify a failure for the retry engine.
///
/// Configuration problems and already-wrapped retry exhaustion are always
/// fatal. A sentinel quorum that cannot name a master is the mid-failover
/// window and therefore always unavailable. Everything else is classified
/// by message text: the error display is lowercased once and scanned for
/// the fixed marker fragments, unavailability first. An error without any
/// recognized fragment is fatal; unrecognized failures are never retried
/// silently.
pub fn classify(error: &ClientError) -> ErrorClass {
    match error {
        ClientError::Configuration(_) | ClientError::RetryLimitExceeded { .. } => ErrorClass::Fatal,
        ClientError::NoMasterFound(_) => ErrorClass::Unavailable,
        other => classify_message(&other.to_string()),
    }
}

fn classify_message(message: &str) -> ErrorClass {
    // Normalize case once, not per comparison.
    let message = message.to_lowercase();

    if UNAVAILABILITY_MARKERS.iter().any(|marker| message.contains(marker)) {
        return ErrorClass::Unavailable;
    }

    if NAME_RESOLUTION_MARKERS.iter().any(|marker| message.contains(marker)) {
        return ErrorClass::NameResolution;
    }

    ErrorClass::Fatal
}
