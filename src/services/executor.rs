//! Tool Executor (C5): turns one batch of [`ToolCall`]s into
//! [`ToolResult`]s — diversity rewrite, permission check, bounded
//! concurrent dispatch, call-id-ordered reassembly (§4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::domain::models::{query_proxy, LogicalModel, ToolCall, ToolName, ToolResult};
use crate::domain::ports::Tool;
use crate::services::diversity::DiversityValidator;
use crate::services::registry::ToolRegistry;

/// Dispatches one tool-call batch against a [`ToolRegistry`], enforcing
/// per-tool concurrency bounds and the model→tool access matrix.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    diversity: DiversityValidator,
    semaphores: HashMap<ToolName, Arc<Semaphore>>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, diversity: DiversityValidator) -> Self {
        let semaphores = registry
            .iter()
            .map(|tool| (tool.name(), Arc::new(Semaphore::new(tool.max_concurrent()))))
            .collect();
        Self {
            registry,
            diversity,
            semaphores,
        }
    }

    /// Execute one batch, returning results in the same order as `calls`
    /// (Testable property #1), regardless of completion order.
    #[instrument(skip(self, calls, cancel), fields(model = %model.as_str(), batch_size = calls.len()))]
    pub async fn execute(
        &self,
        model: LogicalModel,
        web_search: bool,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let rewritten_calls = self.rewrite_for_diversity(calls);

        let futures = rewritten_calls.into_iter().map(|call| {
            let permitted = self.registry.is_permitted(model, web_search, call.tool_name);
            async move {
                if !permitted {
                    warn!(tool = call.tool_name.as_str(), "tool not permitted for model");
                    return ToolResult::failure(call.id.clone(), "tool not permitted for model", 0);
                }

                let Some(tool) = self.registry.get(call.tool_name) else {
                    return ToolResult::failure(call.id.clone(), "tool not permitted for model", 0);
                };
                let Some(semaphore) = self.semaphores.get(&call.tool_name) else {
                    return ToolResult::failure(call.id.clone(), "tool not permitted for model", 0);
                };

                execute_one(Arc::clone(tool), Arc::clone(semaphore), call, cancel).await
            }
        });

        join_all(futures).await
    }

    /// Steps 1-2: extract query proxies, validate diversity, and substitute
    /// the rewritten query back into each call's `query`/`prompt` argument,
    /// preserving every other argument field. Calls whose proxy fell back
    /// to the stringified argument map (no `query`/`prompt` field) are left
    /// unchanged, since there is no single field to rewrite.
    fn rewrite_for_diversity(&self, calls: &[ToolCall]) -> Vec<ToolCall> {
        let proxies: Vec<String> = calls.iter().map(query_proxy).collect();
        let rewritten = self.diversity.diversify(&proxies);

        calls
            .iter()
            .zip(rewritten.iter())
            .map(|(call, new_query)| {
                let mut call = call.clone();
                let original = query_proxy(&call);
                if new_query == &original {
                    return call;
                }
                if call.arguments.contains_key("query") {
                    call.arguments.insert("query".to_string(), Value::String(new_query.clone()));
                } else if call.arguments.contains_key("prompt") {
                    call.arguments.insert("prompt".to_string(), Value::String(new_query.clone()));
                }
                call
            })
            .collect()
    }
}

/// One call's full lifecycle: semaphore acquisition, timeout, execution —
/// every exit path releases the permit and honors `cancel`.
async fn execute_one(
    tool: Arc<dyn Tool>,
    semaphore: Arc<Semaphore>,
    call: ToolCall,
    cancel: &CancellationToken,
) -> ToolResult {
    let started = Instant::now();

    let permit = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return ToolResult::failure(call.id.clone(), "cancelled", started.elapsed().as_millis() as u64);
        }
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return ToolResult::failure(call.id.clone(), "tool unavailable", started.elapsed().as_millis() as u64);
            }
        },
    };

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            drop(permit);
            return ToolResult::failure(call.id.clone(), "cancelled", started.elapsed().as_millis() as u64);
        }
        result = tokio::time::timeout(tool.timeout(), tool.execute(&call, cancel)) => result,
    };
    drop(permit);

    match outcome {
        Ok(result) => result,
        Err(_elapsed) => ToolResult::failure(call.id.clone(), "timeout", started.elapsed().as_millis() as u64),
    }
}
