//! The error taxonomy realizing SPEC_FULL.md §7 as a concrete enum.
//!
//! Every fallible boundary in the core — provider HTTP, JSON parsing, tool
//! dispatch, resource reservation, research planning — converges on this
//! single type so callers classify failures by matching on a kind rather
//! than parsing strings.

use thiserror::Error;

use crate::infrastructure::provider::errors::ProviderError;

/// Errors surfaced across the model-routing, tool, and research subsystems.
#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    /// Request malformed or outside a declared limit. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Deadline expired at the provider or a tool. Already retried by the
    /// caller's policy before reaching this point.
    #[error("request timed out")]
    Timeout,

    /// Provider returned 429; already retried honoring `Retry-After`.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds the provider asked the caller to wait.
        retry_after_secs: u64,
    },

    /// Provider returned 401/403 or an equivalent authentication signal.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider returned 402 or another billing/quota signal.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Provider returned 5xx or a network error, after exhausting retries.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Provider returned a 4xx other than 429. Never retried.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Tool not present in `registry.available(model, webSearch)`.
    #[error("tool '{tool}' not permitted for model '{model}'")]
    ToolNotPermitted {
        /// Name of the tool that was denied.
        tool: String,
        /// Logical model the call was attempted under.
        model: String,
    },

    /// Tool raised or timed out during execution.
    #[error("tool '{tool}' failed: {reason}")]
    ToolFailed {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The 500k-token reservation ceiling rejected this request.
    #[error("resource exhausted: requested {requested}, only {available} available")]
    ResourceExhausted {
        /// Tokens the caller asked to reserve.
        requested: u64,
        /// Tokens that were actually free at rejection time.
        available: u64,
    },

    /// Research plan was malformed or its subtask dependency graph cyclic.
    #[error("research plan invalid: {0}")]
    PlanInvalid(String),

    /// Invariant violation; logged with full context upstream.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the core.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Whether this error kind is ever retried by the component that raises
    /// it. Retries already happened by the time this type is constructed;
    /// this reflects the *policy*, for logging and metrics, not a
    /// still-pending retry.
    #[must_use]
    pub const fn is_retryable_kind(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimit { .. } | Self::Unavailable(_)
        )
    }

    /// Whether the chat path should surface this to the caller verbatim
    /// (as opposed to being swallowed and logged, e.g. retrieval failures
    /// which never construct this type at all).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::ToolNotPermitted { .. } | Self::ToolFailed { .. })
    }
}

impl From<ProviderError> for OrchestratorError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidRequest(msg) => Self::BadRequest(msg),
            ProviderError::InvalidApiKey | ProviderError::Forbidden(_) => {
                Self::Auth(err.to_string())
            }
            ProviderError::QuotaExceeded(msg) => Self::Quota(msg),
            ProviderError::NotFound => Self::BadRequest("resource not found".to_string()),
            ProviderError::RateLimitExceeded { retry_after_secs } => {
                Self::RateLimit { retry_after_secs }
            }
            ProviderError::ServerError(status, msg) => {
                Self::Unavailable(format!("server error ({status}): {msg}"))
            }
            ProviderError::NetworkError(msg) => Self::Unavailable(msg),
            ProviderError::JsonError(msg) => Self::Internal(format!("json error: {msg}")),
            ProviderError::Timeout => Self::Timeout,
            ProviderError::Cancelled => Self::Internal("request cancelled".to_string()),
            ProviderError::UnknownError(status, msg) => {
                Self::Internal(format!("unknown provider error ({status}): {msg}"))
            }
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}

impl From<crate::domain::ports::ModelAdapterError> for OrchestratorError {
    fn from(err: crate::domain::ports::ModelAdapterError) -> Self {
        use crate::domain::ports::ModelAdapterError as E;
        match err {
            E::Timeout => Self::Timeout,
            E::RateLimit { retry_after_secs } => Self::RateLimit { retry_after_secs },
            E::Auth(msg) => Self::Auth(msg),
            E::Quota(msg) => Self::Quota(msg),
            E::BadRequest(msg) => Self::BadRequest(msg),
            E::Unavailable(msg) => Self::Unavailable(msg),
            E::Internal(msg) => Self::Internal(msg),
        }
    }
}
