//! Centralized error types for the Pulse agent.
//!
//! This module provides a typed error hierarchy that:
//! - Keeps transient network failures apart from malformed payloads
//! - Preserves full error context for logging
//!
//! None of these errors is fatal to the agent. Every failure path ends in
//! "no update this cycle" and the last good cache record stays in place.

use thiserror::Error;

/// Failure of a single remote JSON fetch.
///
/// Non-2xx statuses are folded into `Network` together with transport
/// failures; the status code only survives in the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Malformed response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether the next scheduled cycle has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Timeout)
    }
}

/// Key-value store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed for key {key}: {message}")]
    WriteFailed { key: String, message: String },

    #[error("Read failed for key {key}: {message}")]
    ReadFailed { key: String, message: String },
}

/// Location provider errors.
///
/// Providers report these; the resolver swallows them and treats the
/// provider as disabled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location service unavailable")]
    ServiceUnavailable,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location error: {0}")]
    Other(String),
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_fetch_error(self) -> FetchError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_fetch_error(self) -> FetchError {
        if self.is_timeout() {
            FetchError::Timeout
        } else if self.is_decode() {
            FetchError::Parse(self.to_string())
        } else {
            FetchError::Network(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_store_error(self, key: &str, writing: bool) -> StoreError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_store_error(self, key: &str, writing: bool) -> StoreError {
        if writing {
            StoreError::WriteFailed {
                key: key.to_string(),
                message: self.to_string(),
            }
        } else {
            StoreError::ReadFailed {
                key: key.to_string(),
                message: self.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_transience() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Network("refused".into()).is_transient());
        assert!(!FetchError::Parse("not json".into()).is_transient());
    }

    #[test]
    fn test_store_error_display_names_key() {
        let err = StoreError::WriteFailed {
            key: "weather_data".into(),
            message: "disk full".into(),
        };
        assert!(err.to_string().contains("weather_data"));
        assert!(err.to_string().contains("disk full"));
    }
}
