//! Audit logging for security-relevant operations
//!
//! Provides a structured JSON audit trail for:
//! - Research plan creation/cancellation
//! - Sub-agent spawning/failures
//! - Configuration changes
//! - Provider credential access
//! - Denied tool invocations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Audit logger for security-relevant operations
#[derive(Clone)]
pub struct AuditLogger {
    log_file: Arc<Mutex<File>>,
}

/// Audit event types for categorizing operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ResearchPlanCreated,
    ResearchPlanCancelled,
    SubAgentSpawned,
    SubAgentFailed,
    ConfigChanged,
    ProviderKeyAccessed,
    ToolAccessDenied,
}

/// Outcome of an audited operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    PartialSuccess,
}

/// Complete audit event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub operation: String,
    pub actor: String,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub metadata: Option<Value>,
}

impl AuditLogger {
    /// Create a new audit logger writing to the specified file
    ///
    /// Creates parent directories if they don't exist
    /// Opens file in append mode to preserve existing audit trail
    pub async fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let log_path = log_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create audit log directory")?;
        }

        // Open file in append mode (blocking operation)
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .context("failed to open audit log file")?;

        Ok(Self {
            log_file: Arc::new(Mutex::new(file)),
        })
    }

    /// Log an audit event
    ///
    /// Writes the event as a JSON line to the audit log file
    /// Also emits a tracing info event for structured logging
    pub async fn log_event(&self, event: AuditEvent) -> Result<()> {
        // Serialize to JSON
        let json = serde_json::to_string(&event).context("failed to serialize audit event")?;

        // Write to file (blocking operation in mutex)
        {
            let mut file = self
                .log_file
                .lock()
                .map_err(|e| anyhow::anyhow!("audit log mutex poisoned: {}", e))?;

            writeln!(file, "{}", json).context("failed to write audit event")?;
            file.flush().context("failed to flush audit log")?;
        }

        // Also log to tracing infrastructure
        info!(
            event_type = ?event.event_type,
            operation = %event.operation,
            actor = %event.actor,
            resource_id = ?event.resource_id,
            outcome = ?event.outcome,
            "audit event"
        );

        Ok(())
    }

    /// Convenience method for logging an operation
    ///
    /// # Arguments
    /// * `operation` - Description of the operation (e.g., "cancel_research_plan", "spawn_agent")
    /// * `actor` - User or system component performing the operation
    /// * `resource_id` - Optional identifier of the affected resource
    /// * `success` - Whether the operation succeeded
    /// * `metadata` - Optional additional context as JSON
    pub async fn log_operation(
        &self,
        operation: &str,
        actor: &str,
        resource_id: Option<&str>,
        success: bool,
        metadata: Option<Value>,
    ) -> Result<()> {
        // Infer event type from operation name
        let event_type = self.infer_event_type(operation);

        let outcome = if success {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };

        let event = AuditEvent {
            timestamp: Utc::now(),
            event_type,
            operation: operation.to_string(),
            actor: actor.to_string(),
            resource_id: resource_id.map(String::from),
            outcome,
            metadata,
        };

        self.log_event(event).await
    }

    /// Infer event type from operation name
    fn infer_event_type(&self, operation: &str) -> AuditEventType {
        let op_lower = operation.to_lowercase();

        if (op_lower.contains("plan") || op_lower.contains("research")) && op_lower.contains("create")
        {
            AuditEventType::ResearchPlanCreated
        } else if (op_lower.contains("plan") || op_lower.contains("research"))
            && op_lower.contains("cancel")
        {
            AuditEventType::ResearchPlanCancelled
        } else if op_lower.contains("agent") && op_lower.contains("fail") {
            // Check for "fail" before "spawn" to handle "spawn_failed" correctly
            AuditEventType::SubAgentFailed
        } else if op_lower.contains("agent") && op_lower.contains("spawn") {
            AuditEventType::SubAgentSpawned
        } else if op_lower.contains("tool") && (op_lower.contains("deny") || op_lower.contains("denied"))
        {
            AuditEventType::ToolAccessDenied
        } else if op_lower.contains("config") {
            AuditEventType::ConfigChanged
        } else if (op_lower.contains("api") || op_lower.contains("provider"))
            && op_lower.contains("key")
        {
            AuditEventType::ProviderKeyAccessed
        } else {
            // Default to config changed for unrecognized operations
            warn!(operation = %operation, "could not infer audit event type");
            AuditEventType::ConfigChanged
        }
    }
}
