//! Tool schemas, calls, and results — the core's normalized shapes for the
//! tool subsystem (C3-C5).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of built-in tool kinds (SPEC_FULL.md §3 supplementary
/// entities), used as the registry's internal key instead of a bare string
/// so a typo is a compile error at every exhaustively-matching call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolName {
    Coder,
    Multimodal,
    LightSearch,
    MediumSearch,
}

impl ToolName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coder => "coder",
            Self::Multimodal => "multimodal",
            Self::LightSearch => "light-search",
            Self::MediumSearch => "medium-search",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "coder" => Some(Self::Coder),
            "multimodal" => Some(Self::Multimodal),
            "light-search" => Some(Self::LightSearch),
            "medium-search" => Some(Self::MediumSearch),
            _ => None,
        }
    }
}

/// A tool's advertised schema. Unique by `name` within a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: ToolName,
    pub description: String,
    pub parameters: Value,
}

/// A tool invocation the model emitted. `id` is unique within a single
/// response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: ToolName,
    pub arguments: HashMap<String, Value>,
}

/// The outcome of executing a [`ToolCall`]. Pairs 1:1 by `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolResult {
    #[must_use]
    pub fn success(call_id: impl Into<String>, value: Value, elapsed_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            ok: true,
            value: Some(value),
            error: None,
            elapsed_ms,
        }
    }

    #[must_use]
    pub fn failure(call_id: impl Into<String>, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            ok: false,
            value: None,
            error: Some(error.into()),
            elapsed_ms,
        }
    }
}

/// Extracts the *query proxy* C5 step 1 needs for diversity validation: the
/// `query` or `prompt` argument field, else the stringified argument map.
#[must_use]
pub fn query_proxy(call: &ToolCall) -> String {
    call.arguments
        .get("query")
        .or_else(|| call.arguments.get("prompt"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| serde_json::to_string(&call.arguments).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_name_round_trips_kebab_case() {
        assert_eq!(ToolName::parse("light-search"), Some(ToolName::LightSearch));
        assert_eq!(ToolName::LightSearch.as_str(), "light-search");
    }

    #[test]
    fn test_tool_name_rejects_unknown() {
        assert_eq!(ToolName::parse("bogus"), None);
    }

    #[test]
    fn test_query_proxy_prefers_query_field() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), json!("rust async runtimes"));
        args.insert("limit".to_string(), json!(5));
        let call = ToolCall {
            id: "call_1".to_string(),
            tool_name: ToolName::LightSearch,
            arguments: args,
        };
        assert_eq!(query_proxy(&call), "rust async runtimes");
    }

    #[test]
    fn test_query_proxy_falls_back_to_stringified_args() {
        let mut args = HashMap::new();
        args.insert("path".to_string(), json!("/tmp/x"));
        let call = ToolCall {
            id: "call_1".to_string(),
            tool_name: ToolName::Coder,
            arguments: args,
        };
        assert!(query_proxy(&call).contains("/tmp/x"));
    }
}
