//! Normalized request/response types shared by every component. Nothing
//! here is provider-specific — [`crate::adapters`] translates to and from
//! these types exactly once, at the provider boundary.

pub mod context_usage;
pub mod envelope;
pub mod message;
pub mod model_spec;
pub mod research;
pub mod tool;

pub use context_usage::{ContextUsage, ModelKind};
pub use envelope::{Envelope, EnvelopeChoice, FinishReason, Usage};
pub use message::{Message, Role};
pub use model_spec::{Capability, LogicalModel, ModelSpec};
pub use research::{
    ResearchPlan, ResearchResult, ResearchStatus, SubAgentExecution, SubAgentState, Subtask,
};
pub use tool::{query_proxy, ToolCall, ToolName, ToolResult, ToolSchema};
