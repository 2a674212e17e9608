//! The Model Adapter port (C2): translates between the core's normalized
//! types and one provider's wire format.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{Capability, Envelope, Message, ToolSchema};

/// Optional generation parameters a caller may request; an adapter that
/// cannot honor one (e.g. a provider without streaming) silently ignores it.
#[derive(Debug, Clone, Default)]
pub struct GenerateParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stream: Option<bool>,
}

/// Failure classification a [`ModelAdapter`] surfaces, matching §4.2's
/// `ModelError.kind` set.
#[derive(Debug, Error, Clone)]
pub enum ModelAdapterError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("internal adapter error: {0}")]
    Internal(String),
}

/// One logical model's adapter: wraps a Provider Client, normalizes
/// prompt + tool schemas out and the provider's response back into an
/// [`Envelope`].
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Generate a completion for `messages`, optionally offering `tools`.
    async fn generate(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        params: &GenerateParams,
        cancel: &CancellationToken,
    ) -> Result<Envelope, ModelAdapterError>;

    /// Cheap structural validation: at least one non-empty message; total
    /// input chars below this model's per-model cap; tool count below cap.
    fn validate_request(&self, messages: &[Message], tools: Option<&[ToolSchema]>) -> bool;

    /// Capabilities this adapter's backing model advertises.
    fn capabilities(&self) -> &[Capability];

    /// Context-window cap, in tokens.
    fn max_tokens(&self) -> u32;
}
