//! Chat Core (C6): serves one chat-completion request end to end — context
//! injection, research-plan hand-off, the tool-invocation loop, and the
//! resource-reservation envelope around it all (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::adapters::chat::new_request_id;
use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    last_user_content, Envelope, EnvelopeChoice, FinishReason, LogicalModel, Message, ModelKind,
    Role, ToolCall, ToolResult, ToolSchema,
};
use crate::domain::ports::{GenerateParams, ModelAdapter, RagCollaborator, RetrievalMode};
use crate::services::coordinator::AgentCoordinator;
use crate::services::executor::ToolExecutor;
use crate::services::registry::ToolRegistry;
use crate::services::research::ResearchOrchestrator;
use crate::services::resource_monitor::{ReserveOutcome, ResourceMonitor};

/// Above this length, a query is treated as "long" both for the retrieval
/// mode choice and the research-classification check (§4.6 steps 2-3).
const LONG_QUERY_CHARS: usize = 100;
const CONTEXT_TOP_K: usize = 10;
const RESEARCH_KEYWORDS: [&str; 5] = ["research", "analyze", "investigate", "comprehensive", "detailed"];

/// One normalized chat-completion request.
pub struct ChatRequest {
    pub model: LogicalModel,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolSchema>>,
    pub web_search: bool,
    pub params: GenerateParams,
}

/// Wires together one adapter per logical model, the tool subsystem
/// (C3-C5), the resource monitor (C9), and optionally the RAG collaborator
/// and research orchestrator (C7) a deployment may omit.
pub struct ChatCore {
    adapters: HashMap<LogicalModel, Arc<dyn ModelAdapter>>,
    registry: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
    resource_monitor: Arc<ResourceMonitor>,
    rag: Option<Arc<dyn RagCollaborator>>,
    research: Option<Arc<ResearchOrchestrator>>,
    tool_iteration_cap: u32,
}

impl ChatCore {
    #[must_use]
    pub fn new(
        adapters: HashMap<LogicalModel, Arc<dyn ModelAdapter>>,
        registry: Arc<ToolRegistry>,
        executor: Arc<ToolExecutor>,
        resource_monitor: Arc<ResourceMonitor>,
        rag: Option<Arc<dyn RagCollaborator>>,
        research: Option<Arc<ResearchOrchestrator>>,
        tool_iteration_cap: u32,
    ) -> Self {
        Self {
            adapters,
            registry,
            executor,
            resource_monitor,
            rag,
            research,
            tool_iteration_cap,
        }
    }

    /// Steps 1-6 of §4.6, wrapped by the pre-flight resource reservation.
    #[instrument(skip(self, request, cancel), fields(model = %request.model.as_str(), web_search = request.web_search))]
    pub async fn complete(&self, mut request: ChatRequest, cancel: &CancellationToken) -> OrchestratorResult<Envelope> {
        let adapter = self
            .adapters
            .get(&request.model)
            .ok_or_else(|| OrchestratorError::Validation(format!("unknown model '{}'", request.model.as_str())))?;

        if !adapter.validate_request(&request.messages, request.tools.as_deref()) {
            return Err(OrchestratorError::Validation("request failed adapter validation".to_string()));
        }

        let mut messages = request.messages.clone();
        let mut research_plan = None;

        if let Some(query) = last_user_content(&messages).map(str::to_string) {
            let is_long = query.len() > LONG_QUERY_CHARS;

            if let Some(rag) = &self.rag {
                let mode = if is_long { RetrievalMode::Research } else { RetrievalMode::General };
                match rag.retrieve(&query, mode, CONTEXT_TOP_K).await {
                    Ok(chunks) if !chunks.is_empty() => {
                        let context = chunks.iter().map(|c| format!("- {}", c.content)).collect::<Vec<_>>().join("\n");
                        messages.insert(0, Message::system(format!("Use the following context:\n{context}")));
                    }
                    Ok(_) => {}
                    Err(error) => warn!(%error, "context retrieval failed, proceeding without context"),
                }
            }

            if request.web_search && is_long && contains_research_keyword(&query) {
                if let Some(research) = &self.research {
                    match research.plan_only(&query, cancel).await {
                        Ok(plan) => research_plan = Some(plan),
                        Err(error) => warn!(%error, "research plan generation failed, continuing without a plan"),
                    }
                }
            }
        }

        let tools = if request.tools.is_some() || request.web_search {
            Some(self.registry.schemas(request.model, request.web_search))
        } else {
            request.tools.take()
        };

        let request_id = new_request_id();
        let estimated_tokens = estimate_tokens(&messages);
        match self.resource_monitor.reserve(request_id.clone(), estimated_tokens, model_kind_of(request.model)).await {
            ReserveOutcome::Rejected { requested, available } => {
                return Err(OrchestratorError::ResourceExhausted { requested, available });
            }
            ReserveOutcome::Ok => {}
        }

        let outcome = self
            .run_generation_loop(adapter.as_ref(), request.model, request.web_search, &mut messages, tools.as_deref(), &request.params, cancel)
            .await;

        self.resource_monitor.release(&request_id).await;

        let mut envelope = outcome?;
        envelope.research_plan = research_plan;
        Ok(envelope)
    }

    /// Step 5: call `generate`, dispatch any tool calls through C5, and
    /// repeat until a non-tool response or the iteration cap is reached.
    async fn run_generation_loop(
        &self,
        adapter: &dyn ModelAdapter,
        model: LogicalModel,
        web_search: bool,
        messages: &mut Vec<Message>,
        tools: Option<&[ToolSchema]>,
        params: &GenerateParams,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<Envelope> {
        for _ in 0..self.tool_iteration_cap {
            let envelope = adapter.generate(messages, tools, params, cancel).await?;

            let Some(choice) = envelope.first_choice() else {
                return Ok(envelope);
            };
            if choice.finish_reason != FinishReason::ToolCalls {
                return Ok(envelope);
            }
            let calls = extract_tool_calls(choice);
            if calls.is_empty() {
                return Ok(envelope);
            }

            messages.push(choice.message.clone());
            let results = self.executor.execute(model, web_search, &calls, cancel).await;
            for result in &results {
                messages.push(tool_result_message(result));
            }
        }

        Err(OrchestratorError::Internal("tool iteration cap reached without a final response".to_string()))
    }
}

/// Builds a [`ChatCore`]'s sibling C7 orchestrator sharing the same large
/// adapter and agent pool, for deployments that wire both at once.
#[must_use]
pub fn research_orchestrator(
    planner_adapter: Arc<dyn ModelAdapter>,
    subagent_adapter: Arc<dyn ModelAdapter>,
    coordinator: Arc<AgentCoordinator>,
    rag: Option<Arc<dyn RagCollaborator>>,
    pdf: Option<Arc<dyn crate::domain::ports::PdfRenderer>>,
    max_age_hours: u64,
) -> ResearchOrchestrator {
    ResearchOrchestrator::new(planner_adapter, subagent_adapter, coordinator, rag, pdf, max_age_hours)
}

fn model_kind_of(model: LogicalModel) -> ModelKind {
    match model {
        LogicalModel::ChatLarge | LogicalModel::ChatLight | LogicalModel::Reranker => ModelKind::General,
        LogicalModel::ChatCode => ModelKind::Code,
        LogicalModel::Multimodal => ModelKind::Multimodal,
        LogicalModel::Embedding => ModelKind::Embedding,
    }
}

fn estimate_tokens(messages: &[Message]) -> u64 {
    let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
    (total_chars / 4) as u64
}

fn contains_research_keyword(query: &str) -> bool {
    let lower = query.to_lowercase();
    RESEARCH_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

fn extract_tool_calls(choice: &EnvelopeChoice) -> Vec<ToolCall> {
    choice
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.get("toolCalls"))
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}

fn tool_result_message(result: &ToolResult) -> Message {
    let content = if result.ok {
        result.value.clone().map(|v| v.to_string()).unwrap_or_default()
    } else {
        format!("error: {}", result.error.clone().unwrap_or_default())
    };
    let mut message = Message::new(Role::Tool, content);
    message.name = Some(result.call_id.clone());
    message
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::domain::models::{Capability, ToolName};
    use crate::domain::ports::{ModelAdapterError, Tool};
    use crate::services::diversity::DiversityValidator;

    struct StaticAdapter {
        capabilities: Vec<Capability>,
        responses: std::sync::Mutex<Vec<Envelope>>,
    }

    fn envelope_with_content(content: &str, finish_reason: FinishReason) -> Envelope {
        Envelope {
            id: "env-1".to_string(),
            created_at: chrono::Utc::now(),
            model: "test-model".to_string(),
            choices: vec![EnvelopeChoice {
                index: 0,
                message: Message::assistant(content),
                finish_reason,
                metadata: None,
            }],
            usage: crate::domain::models::Usage::new(10, 10),
            research_plan: None,
        }
    }

    fn envelope_with_tool_call(call: &ToolCall) -> Envelope {
        Envelope {
            id: "env-0".to_string(),
            created_at: chrono::Utc::now(),
            model: "test-model".to_string(),
            choices: vec![EnvelopeChoice {
                index: 0,
                message: Message::assistant(""),
                finish_reason: FinishReason::ToolCalls,
                metadata: Some(serde_json::json!({ "toolCalls": [call] })),
            }],
            usage: crate::domain::models::Usage::new(10, 10),
            research_plan: None,
        }
    }

    #[async_trait]
    impl ModelAdapter for StaticAdapter {
        async fn generate(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolSchema]>,
            _params: &GenerateParams,
            _cancel: &CancellationToken,
        ) -> Result<Envelope, ModelAdapterError> {
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }

        fn validate_request(&self, messages: &[Message], _tools: Option<&[ToolSchema]>) -> bool {
            !messages.is_empty()
        }

        fn capabilities(&self) -> &[Capability] {
            &self.capabilities
        }

        fn max_tokens(&self) -> u32 {
            128_000
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> ToolName {
            ToolName::LightSearch
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: ToolName::LightSearch,
                description: "echo".to_string(),
                parameters: serde_json::json!({}),
            }
        }

        fn max_concurrent(&self) -> usize {
            2
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn execute(&self, call: &ToolCall, _cancel: &CancellationToken) -> ToolResult {
            ToolResult::success(call.id.clone(), serde_json::json!({ "answer": 42 }), 0)
        }
    }

    fn chat_core(adapter: Arc<dyn ModelAdapter>) -> ChatCore {
        let mut adapters = HashMap::new();
        adapters.insert(LogicalModel::ChatLarge, adapter);
        let registry = Arc::new(ToolRegistry::new(vec![Arc::new(EchoTool)]));
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), DiversityValidator::default()));
        let resource_monitor = Arc::new(ResourceMonitor::new(500_000));
        ChatCore::new(adapters, registry, executor, resource_monitor, None, None, 8)
    }

    fn request(messages: Vec<Message>, web_search: bool) -> ChatRequest {
        ChatRequest {
            model: LogicalModel::ChatLarge,
            messages,
            tools: None,
            web_search,
            params: GenerateParams::default(),
        }
    }

    #[tokio::test]
    async fn test_plain_chat_returns_final_envelope() {
        let adapter = Arc::new(StaticAdapter {
            capabilities: vec![Capability::Chat],
            responses: std::sync::Mutex::new(vec![envelope_with_content("hello", FinishReason::Stop)]),
        });
        let core = chat_core(adapter);
        let cancel = CancellationToken::new();
        let envelope = core.complete(request(vec![Message::user("hi")], false), &cancel).await.unwrap();
        assert_eq!(envelope.choices[0].message.content, "hello");
        assert!(envelope.research_plan.is_none());
    }

    #[tokio::test]
    async fn test_unknown_model_is_validation_error() {
        let adapter = Arc::new(StaticAdapter {
            capabilities: vec![Capability::Chat],
            responses: std::sync::Mutex::new(vec![]),
        });
        let core = chat_core(adapter);
        let cancel = CancellationToken::new();
        let mut req = request(vec![Message::user("hi")], false);
        req.model = LogicalModel::Embedding;
        let result = core.complete(req, &cancel).await;
        assert!(matches!(result, Err(OrchestratorError::Validation(_))));
    }

    #[tokio::test]
    async fn test_tool_call_round_trip_appends_results_and_reinvokes() {
        let mut args = StdHashMap::new();
        args.insert("query".to_string(), Value::String("rust".to_string()));
        let call = ToolCall {
            id: "call_1".to_string(),
            tool_name: ToolName::LightSearch,
            arguments: args,
        };

        let adapter = Arc::new(StaticAdapter {
            capabilities: vec![Capability::Chat],
            responses: std::sync::Mutex::new(vec![
                envelope_with_tool_call(&call),
                envelope_with_content("final answer", FinishReason::Stop),
            ]),
        });
        let core = chat_core(adapter);
        let cancel = CancellationToken::new();
        let envelope = core.complete(request(vec![Message::user("search for rust")], true), &cancel).await.unwrap();
        assert_eq!(envelope.choices[0].message.content, "final answer");
    }

    #[tokio::test]
    async fn test_resource_exhausted_rejects_before_generation() {
        let adapter = Arc::new(StaticAdapter {
            capabilities: vec![Capability::Chat],
            responses: std::sync::Mutex::new(vec![envelope_with_content("unused", FinishReason::Stop)]),
        });
        let mut adapters = HashMap::new();
        adapters.insert(LogicalModel::ChatLarge, adapter as Arc<dyn ModelAdapter>);
        let registry = Arc::new(ToolRegistry::new(vec![Arc::new(EchoTool)]));
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), DiversityValidator::default()));
        let resource_monitor = Arc::new(ResourceMonitor::new(1));
        let core = ChatCore::new(adapters, registry, executor, resource_monitor, None, None, 8);

        let cancel = CancellationToken::new();
        let result = core.complete(request(vec![Message::user("a longer message than one token")], false), &cancel).await;
        assert!(matches!(result, Err(OrchestratorError::ResourceExhausted { .. })));
    }

    #[test]
    fn test_contains_research_keyword_is_case_insensitive() {
        assert!(contains_research_keyword("Please ANALYZE this thoroughly"));
        assert!(!contains_research_keyword("what time is it"));
    }
}
