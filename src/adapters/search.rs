//! Search tools (`light-search`, `medium-search`): thin [`Tool`]
//! implementations over an external search API's chat-style endpoint
//! (§6: `POST {model, messages:[{role:"user",content:query}]} → {choices,
//! citations?}`).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::models::{ToolCall, ToolName, ToolResult, ToolSchema};
use crate::domain::ports::Tool;
use crate::infrastructure::provider::ProviderClient;

#[derive(Debug, Clone, Serialize)]
struct SearchRequest<'a> {
    model: &'a str,
    messages: Vec<SearchMessage<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct SearchMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    choices: Vec<SearchChoice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchChoice {
    message: SearchResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponseMessage {
    content: String,
}

/// A search tool backed by one provider model ("fast" for `light-search`,
/// "reasoning" for `medium-search", per §4.4's built-in tools table).
pub struct SearchTool {
    name: ToolName,
    provider_model_id: String,
    client: ProviderClient,
    max_concurrent: usize,
    timeout: Duration,
}

impl SearchTool {
    /// `light-search`: maxConcurrent 2, timeout 30s.
    #[must_use]
    pub fn light(provider_model_id: impl Into<String>, client: ProviderClient) -> Self {
        Self {
            name: ToolName::LightSearch,
            provider_model_id: provider_model_id.into(),
            client,
            max_concurrent: 2,
            timeout: Duration::from_secs(30),
        }
    }

    /// `medium-search`: maxConcurrent 2, timeout 120s.
    #[must_use]
    pub fn medium(provider_model_id: impl Into<String>, client: ProviderClient) -> Self {
        Self {
            name: ToolName::MediumSearch,
            provider_model_id: provider_model_id.into(),
            client,
            max_concurrent: 2,
            timeout: Duration::from_secs(120),
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> ToolName {
        self.name
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name,
            description: format!("Search the web using the {} search model.", self.name.as_str()),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        }
    }

    fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self, call, cancel), fields(tool = %self.name.as_str(), call_id = %call.id))]
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        let started = Instant::now();
        let query = call
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let body = SearchRequest {
            model: &self.provider_model_id,
            messages: vec![SearchMessage { role: "user", content: query }],
        };

        match self.client.send_json::<_, SearchResponse>(&body, "/v1/chat/completions", cancel).await {
            Ok(response) => {
                let content = response
                    .choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .unwrap_or_default();
                ToolResult::success(
                    call.id.clone(),
                    serde_json::json!({ "content": content, "citations": response.citations }),
                    started.elapsed().as_millis() as u64,
                )
            }
            Err(err) => ToolResult::failure(call.id.clone(), err.to_string(), started.elapsed().as_millis() as u64),
        }
    }
}
