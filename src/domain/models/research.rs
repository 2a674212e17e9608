//! Deep-research data model: plans, subtasks, sub-agent executions, and the
//! terminal research result the orchestrator (C7) produces.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::Envelope;
use super::tool::ToolName;

/// A single planner-produced unit of work. Required fields per §9's
/// authoritative resolution: `id`, `title`, `description`, `instructions`,
/// `estimated_duration_secs`, `required_tools`, `dependencies`. `priority`
/// defaults to 0, ties broken by plan order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub instructions: String,
    #[serde(default)]
    pub priority: i32,
    pub required_tools: HashSet<ToolName>,
    pub dependencies: HashSet<String>,
    pub estimated_duration_secs: u64,
}

/// The frozen output of the planning phase. Created by the planner,
/// consumed by spawn/execute; never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub id: String,
    pub query: String,
    pub title: String,
    pub description: String,
    pub subtasks: Vec<Subtask>,
    /// Clamped into `[1, 5]` at parse time (§4.7 phase 1).
    pub estimated_agents: u32,
    pub estimated_duration_secs: u64,
}

impl ResearchPlan {
    /// Clamp `estimated_agents` into the `[1, 5]` range.
    pub fn clamp_estimated_agents(&mut self) {
        self.estimated_agents = self.estimated_agents.clamp(1, 5);
    }

    /// Topologically validates the subtask dependency graph is a DAG.
    /// Cycles are a planner bug and must be rejected before spawn.
    #[must_use]
    pub fn has_cyclic_dependencies(&self) -> bool {
        use std::collections::HashMap;

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        let by_id: HashMap<&str, &Subtask> =
            self.subtasks.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            id: &'a str,
            by_id: &HashMap<&'a str, &'a Subtask>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> bool {
            match marks.get(id) {
                Some(Mark::Done) => return false,
                Some(Mark::Visiting) => return true,
                None => {}
            }
            let Some(subtask) = by_id.get(id) else {
                return false;
            };
            marks.insert(id, Mark::Visiting);
            for dep in &subtask.dependencies {
                if visit(dep.as_str(), by_id, marks) {
                    return true;
                }
            }
            marks.insert(id, Mark::Done);
            false
        }

        self.subtasks
            .iter()
            .any(|s| visit(s.id.as_str(), &by_id, &mut marks))
    }
}

/// Monotone state machine for one sub-agent's execution of one subtask:
/// `pending → running → {succeeded | failed | cancelled}`; `failed` may
/// return to `pending` while `retries < max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// One sub-agent's attempt(s) at a [`Subtask`]. Created atomically with its
/// plan; only its own task mutates it, the coordinator reads snapshots
/// under a lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentExecution {
    pub id: String,
    pub subtask_id: String,
    pub state: SubAgentState,
    pub retries: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SubAgentExecution {
    #[must_use]
    pub fn pending(id: impl Into<String>, subtask_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subtask_id: subtask_id.into(),
            state: SubAgentState::Pending,
            retries: 0,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }
}

/// Terminal classification of a [`ResearchResult`], per §4.7's mapping:
/// all subtasks succeeded => completed; some failed but synthesis
/// succeeded => partial; planning or synthesis failed => failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Completed,
    Partial,
    Failed,
}

/// The research orchestrator's final product, cached in-process keyed by
/// plan id with TTL-based eviction once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub plan: ResearchPlan,
    pub executions: Vec<SubAgentExecution>,
    pub compiled_markdown: String,
    #[serde(default)]
    pub rag_doc_id: Option<String>,
    pub synthesis_envelope: Option<Envelope>,
    #[serde(default)]
    pub pdf_artifact: Option<String>,
    pub status: ResearchStatus,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}
