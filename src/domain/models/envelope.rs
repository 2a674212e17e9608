//! The normalized response envelope every [`crate::adapters`] adapter
//! produces, regardless of the originating provider's wire shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;
use super::research::ResearchPlan;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Token accounting for one generation. `total == prompt + completion` is
/// an invariant every adapter must uphold when constructing an Envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl Usage {
    #[must_use]
    pub const fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }
}

/// One candidate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeChoice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
    /// Arbitrary per-choice metadata, e.g. the code adapter's
    /// `metadata.codeQuality` report from its post-generation quality pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// The normalized response every model adapter returns, constructed once
/// and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub model: String,
    pub choices: Vec<EnvelopeChoice>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_plan: Option<ResearchPlan>,
}

impl Envelope {
    /// First choice's tool calls, if its finish reason is `tool_calls`.
    #[must_use]
    pub fn first_choice(&self) -> Option<&EnvelopeChoice> {
        self.choices.first()
    }
}
