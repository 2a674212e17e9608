use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when interacting with a remote provider endpoint.
///
/// Variants carry only owned, cloneable data (no `reqwest::Error` or
/// `serde_json::Error` directly) so a single failed attempt can be logged,
/// retried, and folded into [`crate::domain::errors::OrchestratorError`]
/// without fighting ownership.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Invalid request parameters (HTTP 400, non-429).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid or missing credentials (HTTP 401).
    #[error("invalid api key - authentication failed")]
    InvalidApiKey,

    /// Forbidden - permission denied (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Billing/quota signal (HTTP 402 or provider-specific quota body).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Resource not found (HTTP 404).
    #[error("resource not found")]
    NotFound,

    /// Rate limit exceeded (HTTP 429). Carries the `Retry-After` value the
    /// provider sent, defaulting to 60 seconds when the header is absent
    /// or unparseable.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Seconds to wait before the next attempt.
        retry_after_secs: u64,
    },

    /// Server error from the provider (HTTP 500, 502, 503, 504, 529).
    #[error("server error ({0}): {1}")]
    ServerError(StatusCode, String),

    /// Network or connection error (DNS, TCP reset, TLS handshake, ...).
    #[error("network error: {0}")]
    NetworkError(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    JsonError(String),

    /// Request deadline expired.
    #[error("request timeout")]
    Timeout,

    /// Caller's cancellation token fired before the request completed.
    #[error("request cancelled")]
    Cancelled,

    /// Unknown or unexpected status code.
    #[error("unknown error ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl ProviderError {
    /// Build a [`ProviderError`] from an HTTP status and response body,
    /// per SPEC_FULL.md §4.1's retry policy: 429 retries honoring
    /// `Retry-After`; other 4xx never retry; 5xx retries like network.
    #[must_use]
    pub fn from_status(status: StatusCode, body: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::InvalidRequest(body),
            StatusCode::UNAUTHORIZED => Self::InvalidApiKey,
            StatusCode::PAYMENT_REQUIRED => Self::QuotaExceeded(body),
            StatusCode::FORBIDDEN => Self::Forbidden(body),
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded {
                retry_after_secs: retry_after_secs.unwrap_or(60),
            },
            s if s.is_server_error() => Self::ServerError(s, body),
            s => Self::UnknownError(s, body),
        }
    }

    /// Returns true if this error is transient and should be retried by the
    /// caller's retry policy (network/timeout/5xx/429).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. }
                | Self::ServerError(_, _)
                | Self::Timeout
                | Self::NetworkError(_)
        )
    }

    /// Returns true if this is a permanent error that should never be
    /// retried regardless of remaining budget.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::InvalidApiKey
                | Self::Forbidden(_)
                | Self::QuotaExceeded(_)
                | Self::NotFound
        )
    }

    /// `Retry-After` seconds, when this is a rate-limit error.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}
