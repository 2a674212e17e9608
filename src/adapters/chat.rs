//! Chat-family model adapters (C2): `chat-large` and `chat-light`. Both
//! share one translation between the core's normalized types and the
//! provider's chat-completion wire contract (§6); they differ only in
//! their backing [`ProviderClient`], model id, and context cap.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::models::{
    Capability, Envelope, EnvelopeChoice, FinishReason, LogicalModel, Message, Role, ToolCall,
    ToolName, ToolSchema, Usage,
};
use crate::domain::ports::{GenerateParams, ModelAdapter, ModelAdapterError};
use crate::infrastructure::provider::errors::ProviderError;
use crate::infrastructure::provider::retry::RetryPolicy;
use crate::infrastructure::provider::types::{
    ChatCompletionRequest, ChatCompletionResponse, WireFunctionDef, WireMessage, WireToolCall,
    WireToolDef,
};
use crate::infrastructure::provider::ProviderClient;

/// A chat-family adapter: wraps one [`ProviderClient`] and translates
/// to/from its wire contract for one logical model.
pub struct ChatAdapter {
    logical_model: LogicalModel,
    provider_model_id: String,
    client: ProviderClient,
    retry: RetryPolicy,
    capabilities: Vec<Capability>,
}

impl ChatAdapter {
    #[must_use]
    pub fn new(
        logical_model: LogicalModel,
        provider_model_id: impl Into<String>,
        client: ProviderClient,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            capabilities: vec![Capability::Chat, Capability::ToolUse],
            logical_model,
            provider_model_id: provider_model_id.into(),
            client,
            retry,
        }
    }

    pub(crate) fn client(&self) -> &ProviderClient {
        &self.client
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn provider_model_id(&self) -> &str {
        &self.provider_model_id
    }
}

/// Build the wire request body out of the normalized conversation + tools.
pub(crate) fn to_wire_request(
    provider_model_id: &str,
    messages: &[Message],
    tools: Option<&[ToolSchema]>,
    params: &GenerateParams,
) -> ChatCompletionRequest {
    let wire_messages = messages.iter().map(to_wire_message).collect();
    let wire_tools = tools.map(|ts| ts.iter().map(to_wire_tool_def).collect());

    ChatCompletionRequest {
        model: provider_model_id.to_string(),
        messages: wire_messages,
        tools: wire_tools,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        stream: params.stream,
    }
}

fn to_wire_message(message: &Message) -> WireMessage {
    WireMessage::new(message.role.as_str(), message.content.clone())
}

fn to_wire_tool_def(schema: &ToolSchema) -> WireToolDef {
    WireToolDef {
        kind: "function".to_string(),
        function: WireFunctionDef {
            name: schema.name.as_str().to_string(),
            description: schema.description.clone(),
            parameters: schema.parameters.clone(),
        },
    }
}

/// Parse `tool_calls[i].function.arguments` (a JSON string on the wire, per
/// §6) into the core's normalized [`ToolCall`], dropping calls whose tool
/// name is not one of the registry's known [`ToolName`]s.
fn parse_tool_calls(wire_calls: &[WireToolCall]) -> Vec<ToolCall> {
    wire_calls
        .iter()
        .filter_map(|wc| {
            let tool_name = ToolName::parse(&wc.function.name)?;
            let arguments: HashMap<String, serde_json::Value> =
                serde_json::from_str(&wc.function.arguments).unwrap_or_default();
            Some(ToolCall {
                id: wc.id.clone(),
                tool_name,
                arguments,
            })
        })
        .collect()
}

/// Translate a provider response into the core's normalized [`Envelope`].
pub(crate) fn from_wire_response(response: ChatCompletionResponse) -> Envelope {
    let choices = response
        .choices
        .into_iter()
        .map(|choice| {
            let tool_calls = choice
                .message
                .tool_calls
                .as_deref()
                .map(parse_tool_calls)
                .unwrap_or_default();

            let finish_reason = if !tool_calls.is_empty() {
                FinishReason::ToolCalls
            } else {
                match choice.finish_reason.as_str() {
                    "length" => FinishReason::Length,
                    "content_filter" => FinishReason::ContentFilter,
                    "tool_calls" => FinishReason::ToolCalls,
                    _ => FinishReason::Stop,
                }
            };

            let content = choice.message.content.unwrap_or_default();
            let message = Message::new(Role::Assistant, content);
            // Tool calls ride alongside content in metadata; downstream (C5)
            // reads them back out of the choice, not off Message itself,
            // since Message has no wire-only tool_call_id/tool_calls fields.
            let metadata = if tool_calls.is_empty() {
                None
            } else {
                Some(serde_json::json!({ "toolCalls": tool_calls }))
            };

            EnvelopeChoice {
                index: choice.index,
                message,
                finish_reason,
                metadata,
            }
        })
        .collect();

    Envelope {
        id: response.id,
        created_at: Utc::now(),
        model: response.model,
        choices,
        usage: Usage::new(response.usage.prompt_tokens, response.usage.completion_tokens),
        research_plan: None,
    }
}

pub(crate) fn map_provider_error(err: ProviderError) -> ModelAdapterError {
    match err {
        ProviderError::Timeout => ModelAdapterError::Timeout,
        ProviderError::RateLimitExceeded { retry_after_secs } => {
            ModelAdapterError::RateLimit { retry_after_secs }
        }
        ProviderError::InvalidApiKey | ProviderError::Forbidden(_) => {
            ModelAdapterError::Auth(err.to_string())
        }
        ProviderError::QuotaExceeded(msg) => ModelAdapterError::Quota(msg),
        ProviderError::InvalidRequest(msg) => ModelAdapterError::BadRequest(msg),
        ProviderError::NotFound => ModelAdapterError::BadRequest("resource not found".to_string()),
        ProviderError::ServerError(_, _) | ProviderError::NetworkError(_) => {
            ModelAdapterError::Unavailable(err.to_string())
        }
        ProviderError::JsonError(msg) => ModelAdapterError::Internal(msg),
        ProviderError::Cancelled => ModelAdapterError::Internal("request cancelled".to_string()),
        ProviderError::UnknownError(_, msg) => ModelAdapterError::Internal(msg),
    }
}

#[async_trait]
impl ModelAdapter for ChatAdapter {
    #[instrument(skip(self, messages, tools, params, cancel), fields(model = %self.logical_model.as_str()))]
    async fn generate(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        params: &GenerateParams,
        cancel: &CancellationToken,
    ) -> Result<Envelope, ModelAdapterError> {
        let request = to_wire_request(&self.provider_model_id, messages, tools, params);

        let response = self
            .retry
            .execute(cancel, || {
                let request = request.clone();
                async move { self.client.send(&request, cancel).await }
            })
            .await
            .map_err(map_provider_error)?;

        Ok(from_wire_response(response))
    }

    fn validate_request(&self, messages: &[Message], tools: Option<&[ToolSchema]>) -> bool {
        if messages.is_empty() || messages.iter().all(|m| m.content.trim().is_empty()) {
            return false;
        }
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        // chars/4 heuristic, consistent with the opaque provider token count.
        if total_chars / 4 > self.max_tokens() as usize {
            return false;
        }
        if let Some(tools) = tools {
            if tools.len() > 128 {
                return false;
            }
        }
        true
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn max_tokens(&self) -> u32 {
        self.logical_model.default_max_context_tokens()
    }
}

/// Generate a request id in the shape providers typically echo back when
/// the core constructs its own (synthesis calls, tests).
#[must_use]
pub fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4())
}
