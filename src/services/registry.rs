//! Tool Registry (C4): owns the set of [`Tool`] instances and the
//! model→tool access matrix (§4.4).

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::{LogicalModel, ToolName, ToolSchema};
use crate::domain::ports::Tool;

/// Holds every registered tool and derives the per-model, per-request
/// access set and schema export the Chat Core and Tool Executor consume.
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let tools = tools.into_iter().map(|tool| (tool.name(), tool)).collect();
        Self { tools }
    }

    /// Look up a registered tool by name.
    #[must_use]
    pub fn get(&self, name: ToolName) -> Option<&Arc<dyn Tool>> {
        self.tools.get(&name)
    }

    /// `available(model, webSearch) -> set<ToolName>` (§4.4): the model's
    /// base tool set, plus the search tools iff `web_search`.
    #[must_use]
    pub fn available(&self, model: LogicalModel, web_search: bool) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = model.base_tools().into_iter().filter(|n| self.tools.contains_key(n)).collect();
        if web_search {
            for search_tool in [ToolName::LightSearch, ToolName::MediumSearch] {
                if self.tools.contains_key(&search_tool) && !names.contains(&search_tool) {
                    names.push(search_tool);
                }
            }
        }
        names
    }

    /// Whether `tool` is permitted for `model` under the current
    /// `web_search` flag — the check C5 step 3 gates dispatch on.
    #[must_use]
    pub fn is_permitted(&self, model: LogicalModel, web_search: bool, tool: ToolName) -> bool {
        self.available(model, web_search).contains(&tool)
    }

    /// `schemas(model, webSearch) -> []ToolSchema` (§4.4).
    #[must_use]
    pub fn schemas(&self, model: LogicalModel, web_search: bool) -> Vec<ToolSchema> {
        self.available(model, web_search)
            .into_iter()
            .filter_map(|name| self.tools.get(&name))
            .map(|tool| tool.schema())
            .collect()
    }

    /// Every registered tool, for the executor to build one semaphore per
    /// tool at construction.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::models::{ToolCall, ToolResult};

    struct StubTool(ToolName);

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> ToolName {
            self.0
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.0,
                description: "stub".to_string(),
                parameters: serde_json::json!({}),
            }
        }

        fn max_concurrent(&self) -> usize {
            1
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn execute(&self, call: &ToolCall, _cancel: &CancellationToken) -> ToolResult {
            ToolResult::success(call.id.clone(), serde_json::json!({}), 0)
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(vec![
            Arc::new(StubTool(ToolName::Coder)),
            Arc::new(StubTool(ToolName::Multimodal)),
            Arc::new(StubTool(ToolName::LightSearch)),
            Arc::new(StubTool(ToolName::MediumSearch)),
        ])
    }

    #[test]
    fn test_chat_code_excludes_coder_without_web_search() {
        let registry = registry();
        let available = registry.available(LogicalModel::ChatCode, false);
        assert!(!available.contains(&ToolName::Coder));
        assert!(available.contains(&ToolName::Multimodal));
    }

    #[test]
    fn test_web_search_adds_search_tools() {
        let registry = registry();
        let available = registry.available(LogicalModel::ChatCode, true);
        assert!(available.contains(&ToolName::LightSearch));
        assert!(available.contains(&ToolName::MediumSearch));
    }

    #[test]
    fn test_is_permitted_reflects_available() {
        let registry = registry();
        assert!(!registry.is_permitted(LogicalModel::ChatCode, false, ToolName::Coder));
        assert!(registry.is_permitted(LogicalModel::ChatLarge, false, ToolName::Coder));
    }

    #[test]
    fn test_schemas_matches_available_count() {
        let registry = registry();
        let schemas = registry.schemas(LogicalModel::ChatLarge, true);
        assert_eq!(schemas.len(), registry.available(LogicalModel::ChatLarge, true).len());
    }
}
