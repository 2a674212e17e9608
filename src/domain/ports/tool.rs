//! The Tool port (C4/C5): one callable capability the Tool Executor may
//! dispatch on a model's behalf.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{ToolCall, ToolName, ToolResult, ToolSchema};

/// One registered tool. Implementations own their own backing adapter or
/// external API client; the registry only holds the trait object plus its
/// concurrency/timeout bounds.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;
    fn schema(&self) -> ToolSchema;
    fn max_concurrent(&self) -> usize;
    fn timeout(&self) -> Duration;

    /// Execute one call. Implementations should honor `cancel` promptly —
    /// the executor races it against the tool's own timeout.
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult;
}
