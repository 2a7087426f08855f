//! Error taxonomy shared by the transport, extraction and pagination layers.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the archiver library.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// Bad caller input. Raised before any network call and never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport-level failure (HTTP status, connection, malformed body).
    #[error("network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
    },

    /// HTTP 429. Never retried locally; callers should cool down.
    #[error("rate limited by upstream{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// A single item did not match any known response shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// A lookup (channel, post) found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiverError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    pub fn network_status(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// True for network errors, including the rate-limit specialisation.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::RateLimited { .. })
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// HTTP status code attached to the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

pub type Result<T, E = ArchiverError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_network() {
        let err = ArchiverError::RateLimited { retry_after: None };
        assert!(err.is_network());
        assert!(err.is_rate_limited());
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_validation_is_not_network() {
        let err = ArchiverError::validation("empty channel id");
        assert!(!err.is_network());
        assert_eq!(err.to_string(), "validation error: empty channel id");
    }

    #[test]
    fn test_rate_limited_display_with_hint() {
        let err = ArchiverError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "rate limited by upstream (retry after 30s)");
    }

    #[test]
    fn test_network_status() {
        let err = ArchiverError::network_status(503, "service unavailable");
        assert_eq!(err.status(), Some(503));
        assert!(err.is_network());
    }
}
