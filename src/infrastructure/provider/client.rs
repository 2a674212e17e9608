//! HTTP client for one remote provider endpoint (C1).
//!
//! Owns connection pooling, auth header injection, a proactive token-bucket
//! throttle, and translates HTTP outcomes into [`ProviderError`]. Retrying
//! is the caller's job ([`super::retry::RetryPolicy`]); this type performs
//! exactly one attempt per [`ProviderClient::send`] call.

use std::time::Duration;

use reqwest::{Client as ReqwestClient, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::errors::ProviderError;
use super::rate_limiter::TokenBucketRateLimiter;
use super::types::{ChatCompletionRequest, ChatCompletionResponse};

/// Static configuration for one provider endpoint, produced by the config
/// loader's provider table (SPEC_FULL.md §3 `ProviderSpec`).
#[derive(Debug, Clone)]
pub struct ProviderClientConfig {
    pub name: String,
    pub base_url: String,
    pub auth_token: String,
    pub request_timeout: Duration,
    /// Proactive admission-control throttle; not a substitute for honoring
    /// `Retry-After` on 429 (applied by the retry policy above this layer).
    pub rate_limit_rps: f64,
}

impl ProviderClientConfig {
    /// Config with the default timeout (300s) and throttle (10 rps).
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            request_timeout: Duration::from_secs(300),
            rate_limit_rps: 10.0,
        }
    }
}

/// One HTTP client bound to one provider endpoint.
pub struct ProviderClient {
    http: ReqwestClient,
    config: ProviderClientConfig,
    throttle: TokenBucketRateLimiter,
}

impl ProviderClient {
    /// Build a client from config. Fails only if the underlying HTTP
    /// client cannot be constructed (TLS backend init failure).
    pub fn new(config: ProviderClientConfig) -> Result<Self, ProviderError> {
        let http = ReqwestClient::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            throttle: TokenBucketRateLimiter::new(config.rate_limit_rps),
            config,
        })
    }

    /// Provider name, for logging/attribution.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Send one chat-completion attempt. Does not retry; does honor
    /// `cancel` by racing it against the in-flight request, discarding any
    /// partial bytes already received.
    #[instrument(skip(self, request, cancel), fields(provider = %self.config.name))]
    pub async fn send(
        &self,
        request: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        self.send_json(request, "/v1/chat/completions", cancel).await
    }

    /// Send one JSON request attempt against `path` under this client's
    /// base URL. Shared by [`Self::send`] and the embedding/reranker/search
    /// adapters, whose wire shapes differ from the chat-completion contract
    /// but whose transport concerns (throttle, cancellation, retry-after
    /// parsing) are identical.
    #[instrument(skip(self, body, cancel), fields(provider = %self.config.name, path))]
    pub async fn send_json<Req, Resp>(
        &self,
        body: &Req,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Resp, ProviderError>
    where
        Req: serde::Serialize + ?Sized,
        Resp: serde::de::DeserializeOwned,
    {
        self.throttle
            .acquire()
            .await
            .map_err(ProviderError::NetworkError)?;

        let url = format!("{}{}", self.config.base_url, path);

        let send_fut = self
            .http
            .post(&url)
            .bearer_auth(&self.config.auth_token)
            .header("content-type", "application/json")
            .json(body)
            .send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProviderError::Cancelled),
            r = send_fut => r?,
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = parse_retry_after(response.headers());
            let body = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                b = response.text() => b.unwrap_or_else(|_| "<unreadable body>".to_string()),
            };
            debug!(%status, "provider returned non-success status");
            return Err(ProviderError::from_status(status, body, retry_after_secs));
        }

        let parsed: Resp = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProviderError::Cancelled),
            r = response.json() => r?,
        };

        Ok(parsed)
    }
}

/// Parse the `Retry-After` header as whole seconds, per SPEC_FULL.md §4.1.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// HTTP status codes this client never retries on (everything 4xx except
/// 429). Exposed for tests asserting the retry boundary.
#[must_use]
pub fn is_non_retryable_client_error(status: StatusCode) -> bool {
    status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ProviderClientConfig::new("test", "https://example.invalid", "key");
        assert!(ProviderClient::new(config).is_ok());
    }

    #[test]
    fn test_non_retryable_boundary() {
        assert!(is_non_retryable_client_error(StatusCode::BAD_REQUEST));
        assert!(is_non_retryable_client_error(StatusCode::UNAUTHORIZED));
        assert!(!is_non_retryable_client_error(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_non_retryable_client_error(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_parse_retry_after_present() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(7));
    }

    #[test]
    fn test_parse_retry_after_absent() {
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
    }
}
