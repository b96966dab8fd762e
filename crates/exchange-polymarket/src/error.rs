//! Error types for the Polymarket venue integration.

use thiserror::Error;

/// Errors that can occur when interacting with Polymarket.
#[derive(Debug, Error)]
pub enum PolymarketError {
    /// Missing or rejected L2 credentials.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// API request failed.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from API.
        message: String,
    },

    /// Order rejected by the venue (including unfilled FOK).
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request or read timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Component used before the orchestrator configured it.
    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PolymarketError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Returns true if retrying after a cooldown is reasonable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PolymarketError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PolymarketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Polymarket operations.
pub type Result<T> = std::result::Result<T, PolymarketError>;
