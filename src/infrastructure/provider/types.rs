//! Wire types for the chat-completion provider contract (SPEC_FULL.md §6):
//! `POST {model, messages, tools?, max_tokens?, temperature?, top_p?,
//! stream?}` → `{id, created, model, choices, usage}`.
//!
//! These are the provider's shapes, not the core's normalized domain
//! types — [`crate::adapters`] parses one into the other exactly once, at
//! the adapter boundary, per the §9 design note against duck-typed
//! response shapes.

use serde::{Deserialize, Serialize};

/// Request body for a chat-completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Concrete provider model id (not the logical model name).
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<WireMessage>,
    /// Tool schemas the model may call, OpenAI function-calling shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "top_p")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// One message on the wire: role, content, optional name, optional tool
/// call metadata (assistant turns that invoked tools, or tool-role replies).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl WireMessage {
    /// Build a simple role/content message with no tool metadata.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Build a tool-role reply, pairing it with the call it answers.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            name: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// OpenAI-style function tool schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolDef {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call the model emitted in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

/// `arguments` is a JSON-encoded string on the wire, per §6 — the core
/// must parse it, not assume it is already structured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Response body for a chat-completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<WireChoice>,
    pub usage: WireUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireChoice {
    pub index: u32,
    pub message: WireMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
