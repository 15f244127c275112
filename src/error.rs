//! Pricegate error types

use std::path::PathBuf;
use std::time::Duration;

/// Pricegate error types.
///
/// `Clone` so that one coalesced outcome can be handed to every waiter.
/// Sources that are not clonable (`serde_json::Error`, `reqwest::Error`,
/// `std::io::Error`) are flattened into their message at the boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceGateError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("failed to decode upstream payload: {0}")]
    Decode(String),

    // Client-correctable errors
    #[error("not available: {0}")]
    NotAvailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Persistence errors
    #[error("persistence error at {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    // Background sweep outcome
    #[error("prewarm completed with {} failures", .failed.len())]
    PartialFailure { failed: Vec<String> },

    /// The in-flight computation for a coalesced key ended without
    /// producing an outcome (the task panicked).
    #[error("computation abandoned for {0}")]
    Abandoned(String),
}

impl PriceGateError {
    /// Whether the error is worth retrying against the same upstream.
    ///
    /// Timeouts and connection failures, rate limiting, request timeouts
    /// (408) and server errors (5xx) are transient. Everything else is
    /// permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Provider-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for PriceGateError {
    fn from(err: serde_json::Error) -> Self {
        PriceGateError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for PriceGateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PriceGateError::Decode(err.to_string())
        } else {
            PriceGateError::Http(err.to_string())
        }
    }
}

/// Result type alias for Pricegate operations
pub type Result<T> = std::result::Result<T, PriceGateError>;
