// src/error.rs

//! Unified error handling for the incident feed service.
//!
//! `AppError` is what public entry points return. The three narrower types
//! below it describe failures the core recovers from locally:
//!
//! - [`FetchError`]: a source could not be fetched; feeds the backoff.
//! - [`NormalizationError`]: one record could not be mapped; it is dropped.
//! - [`InvariantViolation`]: a snapshot broke an identity rule; logged only.

use std::fmt;

use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A feed fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A record could not be normalized
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// The scheduler has already been shut down
    #[error("Scheduler is shut down")]
    Shutdown,
}

impl AppError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure to obtain a parsed snapshot from a feed.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, connection reset, body read)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The feed answered with a non-2xx status
    #[error("feed returned HTTP {0}")]
    Status(u16),

    /// The request did not complete in time
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The body could not be parsed as the feed's format
    #[error("malformed payload: {0}")]
    Payload(String),
}

impl FetchError {
    /// Create a payload error.
    pub fn payload(message: impl fmt::Display) -> Self {
        Self::Payload(message.to_string())
    }
}

/// A single raw record that could not be mapped to a canonical entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot normalize record from {source_name}: {field} {reason}")]
pub struct NormalizationError {
    pub source_name: String,
    pub field: &'static str,
    pub reason: String,
}

impl NormalizationError {
    pub fn new(source_name: impl Into<String>, field: &'static str, reason: impl fmt::Display) -> Self {
        Self {
            source_name: source_name.into(),
            field,
            reason: reason.to_string(),
        }
    }
}

/// Identity rule broken by an incoming snapshot.
///
/// Never fatal: the engine resolves the conflict and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two records in one snapshot share a `source_id`; the later one wins.
    #[error("duplicate source_id {source_id} in snapshot from {source_name}")]
    DuplicateSourceId {
        source_name: String,
        source_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_converts_into_app_error() {
        let err: AppError = FetchError::Status(503).into();
        assert!(matches!(err, AppError::Fetch(FetchError::Status(503))));
        assert_eq!(err.to_string(), "feed returned HTTP 503");
    }

    #[test]
    fn test_normalization_error_message_names_field() {
        let err = NormalizationError::new("sa_cfs", "IncidentNo", "is missing");
        assert_eq!(
            err.to_string(),
            "cannot normalize record from sa_cfs: IncidentNo is missing"
        );
    }
}
