// src/error.rs

//! Unified error handling for the update pipeline.

use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A source is temporarily unreachable or misbehaving. Retry next cycle.
    #[error("source '{site}' unavailable: {reason}")]
    SourceUnavailable { site: String, reason: String },

    /// The source affirmatively reports the series no longer exists.
    #[error("series '{series}' not found on source '{site}'")]
    SeriesNotFound { site: String, series: String },

    /// A source response no longer matches the expected markup.
    #[error("parse error on source '{site}': {message} (response fingerprint {fingerprint})")]
    Parse {
        site: String,
        message: String,
        fingerprint: String,
    },

    /// A single endpoint delivery failed after all retries.
    #[error("delivery to endpoint '{endpoint}' failed: {message}")]
    Delivery { endpoint: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence layer error. Fatal for the current cycle.
    #[error("Store error: {0}")]
    Store(String),
}

impl AppError {
    /// Create a source-unavailable error.
    pub fn unavailable(source: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            site: source.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a series-not-found error.
    pub fn not_found(source: impl Into<String>, series: impl Into<String>) -> Self {
        Self::SeriesNotFound {
            site: source.into(),
            series: series.into(),
        }
    }

    /// Create a parse error, fingerprinting the offending response body.
    pub fn parse(source: impl Into<String>, message: impl fmt::Display, body: &str) -> Self {
        Self::Parse {
            site: source.into(),
            message: message.to_string(),
            fingerprint: fingerprint(body),
        }
    }

    /// Create a delivery error.
    pub fn delivery(endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Delivery {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Whether this error is transient from the scheduler's point of view.
    ///
    /// Transient errors leave the series' stored state untouched and are
    /// retried on the next cycle. Parse errors count as transient but are
    /// escalated separately after repeated failures.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::Parse { .. } | Self::Http(_)
        )
    }
}

/// Short sha256 fingerprint of a response body, for operator log correlation.
pub fn fingerprint(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 16);
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::unavailable("manganato", "timeout").is_transient());
        assert!(AppError::parse("manganato", "missing list", "<html>").is_transient());
        assert!(!AppError::not_found("manganato", "solo-leveling").is_transient());
        assert!(!AppError::store("disk full").is_transient());
    }
}
