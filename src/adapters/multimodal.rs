//! `multimodal` adapter (C2): image/document analysis. Shares the chat
//! wire contract; carries no tool access per §4.2's specialization table.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::adapters::chat::{from_wire_response, map_provider_error, to_wire_request};
use crate::domain::models::{
    Capability, Envelope, LogicalModel, Message, ToolCall, ToolName, ToolResult, ToolSchema,
};
use crate::domain::ports::{GenerateParams, ModelAdapter, ModelAdapterError, Tool};
use crate::infrastructure::provider::retry::RetryPolicy;
use crate::infrastructure::provider::ProviderClient;

pub struct MultimodalAdapter {
    provider_model_id: String,
    client: ProviderClient,
    retry: RetryPolicy,
    capabilities: Vec<Capability>,
}

impl MultimodalAdapter {
    #[must_use]
    pub fn new(provider_model_id: impl Into<String>, client: ProviderClient, retry: RetryPolicy) -> Self {
        Self {
            provider_model_id: provider_model_id.into(),
            client,
            retry,
            capabilities: vec![Capability::Chat, Capability::Vision],
        }
    }
}

#[async_trait]
impl ModelAdapter for MultimodalAdapter {
    #[instrument(skip(self, messages, tools, params, cancel))]
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

    fn validate_request(&self, messages: &[Message], _tools: Option<&[ToolSchema]>) -> bool {
        !messages.is_empty() && messages.iter().any(|m| !m.content.trim().is_empty())
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn max_tokens(&self) -> u32 {
        LogicalModel::Multimodal.default_max_context_tokens()
    }
}

/// The `multimodal` tool (§4.4): maxConcurrent 1, timeout 300s, backed by
/// this adapter's `generate`.
pub struct MultimodalTool {
    adapter: Arc<MultimodalAdapter>,
}

impl MultimodalTool {
    #[must_use]
    pub fn new(adapter: Arc<MultimodalAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for MultimodalTool {
    fn name(&self) -> ToolName {
        ToolName::Multimodal
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: ToolName::Multimodal,
            description: "Analyze an image or document described by a prompt.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "prompt": { "type": "string" } },
                "required": ["prompt"],
            }),
        }
    }

    fn max_concurrent(&self) -> usize {
        1
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(300)
    }

    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        let started = Instant::now();
        let prompt = call
            .arguments
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let messages = vec![Message::user(prompt)];
        let result = self
            .adapter
            .generate(&messages, None, &GenerateParams::default(), cancel)
            .await;

        match result {
            Ok(envelope) => {
                let content = envelope
                    .choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .unwrap_or_default();
                ToolResult::success(
                    call.id.clone(),
                    serde_json::json!({ "content": content }),
                    started.elapsed().as_millis() as u64,
                )
            }
            Err(err) => {
                ToolResult::failure(call.id.clone(), err.to_string(), started.elapsed().as_millis() as u64)
            }
        }
    }
}
