//! Research Orchestrator (C7): the deep-research state machine — plan,
//! spawn, execute (respecting the subtask dependency DAG), compile,
//! ingest, synthesize, and optionally render a PDF artifact (§4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use moka::future::Cache;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    Envelope, Message, ResearchPlan, ResearchResult, ResearchStatus, SubAgentExecution,
    SubAgentState, Subtask, ToolName,
};
use crate::domain::ports::{GenerateParams, ModelAdapter, PdfRenderer, RagCollaborator, RetrievalMode};
use crate::services::coordinator::{job, AgentCoordinator};

const PLANNER_SYSTEM_PROMPT: &str = "You are an expert research coordinator. Your task is to \
analyze research queries and create comprehensive research plans.\n\nFor the given query, create \
a detailed research plan with:\n1. A clear title and description\n2. 3-5 specific subtasks that \
cover different aspects/perspectives\n3. Estimated number of agents needed (1-5)\n4. Estimated \
duration for the entire research\n5. Tools required for each subtask\n\nEach subtask should have \
a specific focus area, detailed instructions for the research agent, and required tools drawn \
from: light-search, medium-search, coder, multimodal. Respond only with JSON matching: \
{\"title\":..,\"description\":..,\"subtasks\":[{\"title\":..,\"description\":..,\"instructions\":..,\
\"priority\":0,\"estimated_duration\":300,\"tools_required\":[..],\"dependencies\":[..]}],\
\"estimated_agents\":3,\"estimated_duration\":900}";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are an expert research analyst. Synthesize the \
compiled research data into a coherent, insightful analysis with five parts: Executive Summary, \
Key Findings, Analysis and Insights, Conclusions and Implications, and Recommendations for \
further research. Highlight patterns across subtasks and note any gaps or limitations.";

const MAX_RETRIES: u32 = 2;
const DEFAULT_SUBAGENT_TIMEOUT_SECS: u64 = 300;
const MARKDOWN_SYNTHESIS_CHAR_CAP: usize = 50_000;
const RAG_CONTEXT_CHAR_CAP: usize = 10_000;
const RAG_TOP_K: usize = 10;

#[derive(Debug, Default, Deserialize)]
struct PlanJson {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    subtasks: Vec<SubtaskJson>,
    estimated_agents: Option<u32>,
    estimated_duration: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SubtaskJson {
    /// The planner's own subtask identifier, referenced by other subtasks'
    /// `dependencies`. Not reused verbatim as `Subtask.id` (ids are
    /// regenerated under the plan's namespace below) but needed to build a
    /// planner-id -> generated-id remap so `dependencies` lands in the same
    /// id space as `Subtask.id`.
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    instructions: String,
    #[serde(default)]
    priority: i32,
    estimated_duration: Option<u64>,
    #[serde(default)]
    tools_required: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Executes the full research workflow and caches terminal results keyed by
/// plan id, evicted after `max_age_hours` (§4.7 Cleanup).
pub struct ResearchOrchestrator {
    planner_adapter: Arc<dyn ModelAdapter>,
    subagent_adapter: Arc<dyn ModelAdapter>,
    coordinator: Arc<AgentCoordinator>,
    rag: Option<Arc<dyn RagCollaborator>>,
    pdf: Option<Arc<dyn PdfRenderer>>,
    cache: Cache<String, Arc<ResearchResult>>,
}

impl ResearchOrchestrator {
    #[must_use]
    pub fn new(
        planner_adapter: Arc<dyn ModelAdapter>,
        subagent_adapter: Arc<dyn ModelAdapter>,
        coordinator: Arc<AgentCoordinator>,
        rag: Option<Arc<dyn RagCollaborator>>,
        pdf: Option<Arc<dyn PdfRenderer>>,
        max_age_hours: u64,
    ) -> Self {
        let cache = Cache::builder().time_to_live(Duration::from_secs(max_age_hours * 3600)).build();
        Self {
            planner_adapter,
            subagent_adapter,
            coordinator,
            rag,
            pdf,
            cache,
        }
    }

    /// Look up a previously completed research result by plan id.
    pub async fn cached(&self, plan_id: &str) -> Option<Arc<ResearchResult>> {
        self.cache.get(plan_id).await
    }

    /// Produce a research plan only, without spawning or executing
    /// subtasks — the hand-off Chat Core uses to attach a `researchPlan`
    /// to an ordinary chat envelope (§4.6 step 3).
    pub async fn plan_only(&self, query: &str, cancel: &CancellationToken) -> OrchestratorResult<ResearchPlan> {
        self.plan(query, cancel).await
    }

    /// Runs plan -> spawn -> execute -> compile -> ingest -> synthesize ->
    /// render end to end, always returning a terminal [`ResearchResult`].
    #[instrument(skip(self, cancel), fields(query = %query))]
    pub async fn conduct(&self, query: &str, cancel: &CancellationToken) -> ResearchResult {
        let started = Instant::now();

        let plan = match self.plan(query, cancel).await {
            Ok(plan) => plan,
            Err(error) => {
                warn!(%error, "research planning failed");
                let result = planning_failed_result(query, started, &error);
                self.cache.insert(result.plan.id.clone(), Arc::new(result.clone())).await;
                return result;
            }
        };

        let mut executions: Vec<SubAgentExecution> =
            plan.subtasks.iter().map(|s| SubAgentExecution::pending(format!("{}-agent", s.id), s.id.clone())).collect();

        self.execute(&plan, &mut executions, cancel).await;

        let compiled_markdown = compile_markdown(&plan, &executions);
        let rag_doc_id = self.ingest(&compiled_markdown, &plan).await;
        let synthesis_envelope = self.synthesize(&plan, &compiled_markdown, cancel).await;
        let pdf_artifact = match &synthesis_envelope {
            Some(envelope) => self.render(&compiled_markdown, envelope).await,
            None => None,
        };

        let status = terminal_status(&executions, synthesis_envelope.is_some());
        let result = ResearchResult {
            plan,
            executions,
            compiled_markdown,
            rag_doc_id,
            synthesis_envelope,
            pdf_artifact,
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        };

        self.cache.insert(result.plan.id.clone(), Arc::new(result.clone())).await;
        result
    }

    /// Phase 1: prompt the large adapter, parse the fenced JSON response,
    /// clamp `estimatedAgents`, and reject cyclic or empty plans.
    async fn plan(&self, query: &str, cancel: &CancellationToken) -> OrchestratorResult<ResearchPlan> {
        let messages =
            vec![Message::system(PLANNER_SYSTEM_PROMPT), Message::user(format!("Create a comprehensive research plan for: {query}"))];
        let params = GenerateParams { max_tokens: Some(4000), ..GenerateParams::default() };

        let envelope = self.planner_adapter.generate(&messages, None, &params, cancel).await?;
        let content = envelope.first_choice().map(|c| c.message.content.as_str()).unwrap_or_default();
        let json_str = extract_json_fence(content);
        let parsed: PlanJson =
            serde_json::from_str(&json_str).map_err(|e| OrchestratorError::PlanInvalid(format!("invalid plan JSON: {e}")))?;

        if parsed.subtasks.is_empty() {
            return Err(OrchestratorError::PlanInvalid("research plan has no subtasks".to_string()));
        }

        let plan_id = format!("research-{}", Uuid::new_v4());

        // The planner emits its own `id` per subtask and references those
        // ids in `dependencies`, but `Subtask.id` is regenerated under this
        // plan's namespace (`{plan_id}-subtask-N`) so ids stay stable and
        // collision-free across plans. Build a remap from the planner's raw
        // ids to the generated ones so `dependencies` — and therefore
        // `has_cyclic_dependencies` and the execution-eligibility check —
        // operate on the same id space as `Subtask.id`.
        let id_remap: HashMap<&str, String> = parsed
            .subtasks
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.id.is_empty())
            .map(|(i, s)| (s.id.as_str(), format!("{plan_id}-subtask-{}", i + 1)))
            .collect();

        let subtasks: Vec<Subtask> = parsed
            .subtasks
            .iter()
            .enumerate()
            .map(|(i, s)| Subtask {
                id: format!("{plan_id}-subtask-{}", i + 1),
                title: if s.title.is_empty() { format!("Subtask {}", i + 1) } else { s.title.clone() },
                description: s.description.clone(),
                instructions: s.instructions.clone(),
                priority: s.priority,
                required_tools: s.tools_required.iter().filter_map(|t| ToolName::parse(t)).collect(),
                dependencies: s
                    .dependencies
                    .iter()
                    .map(|dep| id_remap.get(dep.as_str()).cloned().unwrap_or_else(|| dep.clone()))
                    .collect(),
                estimated_duration_secs: s.estimated_duration.unwrap_or(DEFAULT_SUBAGENT_TIMEOUT_SECS),
            })
            .collect();

        let mut plan = ResearchPlan {
            id: plan_id,
            query: query.to_string(),
            title: if parsed.title.is_empty() { format!("Research: {}", truncate_chars(query, 50)) } else { parsed.title },
            description: parsed.description,
            subtasks,
            estimated_agents: parsed.estimated_agents.unwrap_or(0),
            estimated_duration_secs: parsed.estimated_duration.unwrap_or(900),
        };
        plan.clamp_estimated_agents();

        if plan.has_cyclic_dependencies() {
            return Err(OrchestratorError::PlanInvalid("research plan has cyclic subtask dependencies".to_string()));
        }

        Ok(plan)
    }

    /// Phases 2-3: spawn one execution per subtask and run them to
    /// completion in dependency order, retrying failures up to twice.
    async fn execute(&self, plan: &ResearchPlan, executions: &mut [SubAgentExecution], cancel: &CancellationToken) {
        let subtasks_by_id: HashMap<&str, &Subtask> = plan.subtasks.iter().map(|s| (s.id.as_str(), s)).collect();

        loop {
            let eligible: Vec<usize> = executions
                .iter()
                .enumerate()
                .filter(|(_, e)| e.state == SubAgentState::Pending)
                .filter(|(_, e)| {
                    let Some(subtask) = subtasks_by_id.get(e.subtask_id.as_str()) else { return false };
                    subtask.dependencies.iter().all(|dep| {
                        executions.iter().any(|other| other.subtask_id == *dep && other.state == SubAgentState::Succeeded)
                    })
                })
                .map(|(i, _)| i)
                .collect();

            if eligible.is_empty() {
                break;
            }

            for &i in &eligible {
                executions[i].state = SubAgentState::Running;
                executions[i].started_at = Some(Utc::now());
            }

            let tasks: Vec<_> = eligible
                .iter()
                .map(|&i| {
                    let execution = &executions[i];
                    let subtask = subtasks_by_id[execution.subtask_id.as_str()];
                    self.run_subagent(plan, subtask, execution.id.clone(), cancel)
                })
                .collect();
            let results = futures::future::join_all(tasks).await;

            for (i, outcome) in eligible.into_iter().zip(results) {
                apply_outcome(&mut executions[i], outcome);
            }
        }

        for execution in executions.iter_mut() {
            if execution.state == SubAgentState::Pending || execution.state == SubAgentState::Running {
                execution.state = SubAgentState::Cancelled;
                execution.finished_at = Some(Utc::now());
            }
        }
    }

    async fn run_subagent(
        &self,
        plan: &ResearchPlan,
        subtask: &Subtask,
        execution_id: String,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        let instructions = subagent_instructions(plan, subtask);
        let adapter = Arc::clone(&self.subagent_adapter);
        let timeout_secs = if subtask.estimated_duration_secs == 0 { DEFAULT_SUBAGENT_TIMEOUT_SECS } else { subtask.estimated_duration_secs };
        let request_cancel = cancel.clone();
        let priority = subtask.priority;

        let outcome = self
            .coordinator
            .run(
                execution_id,
                priority,
                Duration::from_secs(timeout_secs),
                job(move |_coordinator_cancel| async move {
                    let messages = vec![Message::user(instructions)];
                    adapter
                        .generate(&messages, None, &GenerateParams::default(), &request_cancel)
                        .await
                        .map(|envelope| {
                            let content = envelope.first_choice().map(|c| c.message.content.clone()).unwrap_or_default();
                            serde_json::Value::String(content)
                        })
                        .map_err(OrchestratorError::from)
                }),
            )
            .await;

        match outcome {
            Ok(value) => Ok(value.as_str().unwrap_or_default().to_string()),
            Err(error) => Err(error.to_string()),
        }
    }

    /// Phase 5: ingest the compiled markdown; unavailability or failure is
    /// non-fatal (§4.7).
    async fn ingest(&self, markdown: &str, plan: &ResearchPlan) -> Option<String> {
        let rag = self.rag.as_ref()?;
        let metadata = serde_json::json!({
            "type": "research_report",
            "plan_id": plan.id,
            "query": plan.query,
            "title": plan.title,
            "agent_count": plan.subtasks.len(),
        });
        match rag.ingest(markdown, metadata).await {
            Ok(doc_id) => Some(doc_id),
            Err(error) => {
                warn!(%error, "rag ingestion failed, continuing without a document id");
                None
            }
        }
    }

    /// Phase 6: synthesize the final analysis, optionally enriched with
    /// retrieved RAG context.
    async fn synthesize(&self, plan: &ResearchPlan, markdown: &str, cancel: &CancellationToken) -> Option<Envelope> {
        let rag_context = match &self.rag {
            Some(rag) => match rag.retrieve(&plan.query, RetrievalMode::Research, RAG_TOP_K).await {
                Ok(chunks) => truncate_chars(&chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n"), RAG_CONTEXT_CHAR_CAP),
                Err(error) => {
                    warn!(%error, "rag context retrieval failed");
                    String::new()
                }
            },
            None => String::new(),
        };

        let user_prompt = format!(
            "Please synthesize the following research on: {}\n\n## Research Plan\n{}\n\n## Compiled Research Data\n{}\n\n## Additional Context (if available)\n{}\n\nPlease provide a comprehensive synthesis of these research findings.",
            plan.query,
            plan.description,
            truncate_chars(markdown, MARKDOWN_SYNTHESIS_CHAR_CAP),
            if rag_context.is_empty() { "No additional context available" } else { &rag_context },
        );
        let messages = vec![Message::system(SYNTHESIS_SYSTEM_PROMPT), Message::user(user_prompt)];
        let params = GenerateParams { max_tokens: Some(8000), ..GenerateParams::default() };

        match self.planner_adapter.generate(&messages, None, &params, cancel).await {
            Ok(envelope) => Some(envelope),
            Err(error) => {
                warn!(%error, "synthesis generation failed");
                None
            }
        }
    }

    /// Phase 7: optional PDF rendering. Failure downgrades only the
    /// artifact, never the overall status (§4.7).
    async fn render(&self, markdown: &str, synthesis: &Envelope) -> Option<String> {
        let pdf = self.pdf.as_ref()?;
        let synthesis_content = synthesis.first_choice().map(|c| c.message.content.as_str()).unwrap_or_default();
        let combined = format!("# Executive Summary\n\n{synthesis_content}\n\n---\n\n# Detailed Research Findings\n\n{markdown}");
        match pdf.render(&combined).await {
            Ok(path) => Some(path),
            Err(error) => {
                warn!(%error, "pdf rendering failed, continuing without an artifact");
                None
            }
        }
    }
}

fn subagent_instructions(plan: &ResearchPlan, subtask: &Subtask) -> String {
    let tools: Vec<&str> = subtask.required_tools.iter().map(|t| t.as_str()).collect();
    format!(
        "You are a research agent working on: {}\n\nResearch Context:\n- Main Query: {}\n- Your Focus: {}\n- Available Tools: {}\n\nInstructions:\n{}\n\nGuidelines:\n1. Use the available tools to gather comprehensive information\n2. Follow query diversity rules when making multiple tool calls\n3. Provide detailed, well-structured findings\n4. Include sources and citations where possible\n5. Focus on your specific aspect while considering the broader research context\n\nYour response should be a comprehensive research report on your assigned topic.",
        subtask.title,
        plan.query,
        subtask.description,
        tools.join(", "),
        subtask.instructions,
    )
}

fn apply_outcome(execution: &mut SubAgentExecution, outcome: Result<String, String>) {
    execution.finished_at = Some(Utc::now());
    match outcome {
        Ok(content) => {
            execution.state = SubAgentState::Succeeded;
            execution.result = Some(content);
            execution.error = None;
        }
        Err(error) => {
            if execution.retries < MAX_RETRIES {
                execution.retries += 1;
                execution.state = SubAgentState::Pending;
                execution.error = Some(error);
                execution.started_at = None;
            } else {
                execution.state = SubAgentState::Failed;
                execution.error = Some(error);
            }
        }
    }
}

/// Phase 4: one markdown document; missing content is an italic
/// placeholder and compilation never fails (§4.7).
fn compile_markdown(plan: &ResearchPlan, executions: &[SubAgentExecution]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", plan.title));
    out.push_str(&format!("**Research Query:** {}\n\n", plan.query));
    out.push_str(&format!("**Description:** {}\n\n", plan.description));
    out.push_str(&format!("**Generated:** {}\n\n", Utc::now().format("%Y-%m-%d %H:%M:%S")));
    out.push_str("---\n\n## Table of Contents\n\n");
    for (i, subtask) in plan.subtasks.iter().enumerate() {
        out.push_str(&format!("{}. [{}](#{})\n", i + 1, subtask.title, slugify(&subtask.title)));
    }
    out.push_str("\n---\n\n");

    let by_subtask: HashMap<&str, &SubAgentExecution> = executions.iter().map(|e| (e.subtask_id.as_str(), e)).collect();

    let mut succeeded_count = 0usize;
    let mut failed_lines = Vec::new();
    for subtask in &plan.subtasks {
        let Some(execution) = by_subtask.get(subtask.id.as_str()) else { continue };
        match execution.state {
            SubAgentState::Succeeded => {
                succeeded_count += 1;
                out.push_str(&format!("## {}\n\n**Focus:** {}\n\n", subtask.title, subtask.description));
                out.push_str(execution.result.as_deref().unwrap_or("*No content available from this research agent.*"));
                out.push_str("\n\n---\n\n");
            }
            SubAgentState::Failed | SubAgentState::Cancelled => {
                failed_lines.push(format!("- **{}**: {}", subtask.title, execution.error.as_deref().unwrap_or("Unknown error")));
            }
            SubAgentState::Pending | SubAgentState::Running => {}
        }
    }

    if !failed_lines.is_empty() {
        out.push_str("## Research Limitations\n\nThe following research areas could not be completed:\n\n");
        for line in &failed_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("\n---\n\n");
    }

    out.push_str("## Research Metadata\n\n");
    out.push_str(&format!("- **Plan ID:** {}\n", plan.id));
    out.push_str(&format!("- **Agents Deployed:** {}\n", executions.len()));
    out.push_str(&format!("- **Successful Agents:** {succeeded_count}\n"));
    out.push_str(&format!("- **Failed Agents:** {}\n", executions.len() - succeeded_count));
    out.push_str(&format!("- **Estimated Duration:** {} seconds\n", plan.estimated_duration_secs));

    out
}

fn terminal_status(executions: &[SubAgentExecution], synthesis_succeeded: bool) -> ResearchStatus {
    if !synthesis_succeeded {
        return ResearchStatus::Failed;
    }
    if executions.iter().all(|e| e.state == SubAgentState::Succeeded) {
        ResearchStatus::Completed
    } else {
        ResearchStatus::Partial
    }
}

fn planning_failed_result(query: &str, started: Instant, error: &OrchestratorError) -> ResearchResult {
    ResearchResult {
        plan: ResearchPlan {
            id: format!("research-failed-{}", Uuid::new_v4()),
            query: query.to_string(),
            title: "Research planning failed".to_string(),
            description: error.to_string(),
            subtasks: Vec::new(),
            estimated_agents: 1,
            estimated_duration_secs: 0,
        },
        executions: Vec::new(),
        compiled_markdown: String::new(),
        rag_doc_id: None,
        synthesis_envelope: None,
        pdf_artifact: None,
        status: ResearchStatus::Failed,
        elapsed_ms: started.elapsed().as_millis() as u64,
        completed_at: Utc::now(),
    }
}

fn slugify(title: &str) -> String {
    title.to_lowercase().replace(' ', "-")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Extracts a fenced JSON block (preferring ` ```json `), falling back to
/// the raw content if no fence is present.
fn extract_json_fence(content: &str) -> String {
    if let Some(start) = content.find("```json") {
        let body_start = start + "```json".len();
        if let Some(end_rel) = content[body_start..].find("```") {
            return content[body_start..body_start + end_rel].trim().to_string();
        }
    }
    if let Some(start) = content.find("```") {
        let body_start = start + 3;
        if let Some(end_rel) = content[body_start..].find("```") {
            return content[body_start..body_start + end_rel].trim().to_string();
        }
    }
    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use crate::domain::models::{Capability, EnvelopeChoice, FinishReason, Usage};
    use crate::domain::ports::ModelAdapterError;
    use crate::services::coordinator::ScalingConfig;

    fn subtask(id: &str, title: &str, deps: &[&str]) -> Subtask {
        Subtask {
            id: id.to_string(),
            title: title.to_string(),
            description: "desc".to_string(),
            instructions: "do it".to_string(),
            priority: 0,
            required_tools: HashSet::new(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            estimated_duration_secs: 60,
        }
    }

    fn plan(subtasks: Vec<Subtask>) -> ResearchPlan {
        ResearchPlan {
            id: "plan-1".to_string(),
            query: "what is rust".to_string(),
            title: "Rust Overview".to_string(),
            description: "an overview".to_string(),
            subtasks,
            estimated_agents: 2,
            estimated_duration_secs: 600,
        }
    }

    #[test]
    fn test_extract_json_fence_prefers_json_tag() {
        let content = "here is the plan\n```json\n{\"title\": \"x\"}\n```\ntrailing";
        assert_eq!(extract_json_fence(content), "{\"title\": \"x\"}");
    }

    #[test]
    fn test_extract_json_fence_falls_back_to_bare_fence() {
        let content = "```\n{\"title\": \"y\"}\n```";
        assert_eq!(extract_json_fence(content), "{\"title\": \"y\"}");
    }

    #[test]
    fn test_extract_json_fence_falls_back_to_raw_content() {
        let content = "{\"title\": \"z\"}";
        assert_eq!(extract_json_fence(content), "{\"title\": \"z\"}");
    }

    #[test]
    fn test_apply_outcome_retries_before_failing() {
        let mut execution = SubAgentExecution::pending("exec-1", "sub-1");
        apply_outcome(&mut execution, Err("boom".to_string()));
        assert_eq!(execution.state, SubAgentState::Pending);
        assert_eq!(execution.retries, 1);

        apply_outcome(&mut execution, Err("boom again".to_string()));
        assert_eq!(execution.state, SubAgentState::Pending);
        assert_eq!(execution.retries, 2);

        apply_outcome(&mut execution, Err("boom a third time".to_string()));
        assert_eq!(execution.state, SubAgentState::Failed);
        assert_eq!(execution.retries, 2);
    }

    #[test]
    fn test_apply_outcome_success_clears_error() {
        let mut execution = SubAgentExecution::pending("exec-1", "sub-1");
        execution.error = Some("previous failure".to_string());
        apply_outcome(&mut execution, Ok("findings".to_string()));
        assert_eq!(execution.state, SubAgentState::Succeeded);
        assert_eq!(execution.result.as_deref(), Some("findings"));
        assert!(execution.error.is_none());
    }

    #[test]
    fn test_terminal_status_all_succeeded_is_completed() {
        let mut a = SubAgentExecution::pending("a", "sub-a");
        a.state = SubAgentState::Succeeded;
        assert_eq!(terminal_status(&[a], true), ResearchStatus::Completed);
    }

    #[test]
    fn test_terminal_status_partial_failure_is_partial() {
        let mut a = SubAgentExecution::pending("a", "sub-a");
        a.state = SubAgentState::Succeeded;
        let mut b = SubAgentExecution::pending("b", "sub-b");
        b.state = SubAgentState::Failed;
        assert_eq!(terminal_status(&[a, b], true), ResearchStatus::Partial);
    }

    #[test]
    fn test_terminal_status_synthesis_failure_is_failed() {
        let mut a = SubAgentExecution::pending("a", "sub-a");
        a.state = SubAgentState::Succeeded;
        assert_eq!(terminal_status(&[a], false), ResearchStatus::Failed);
    }

    #[test]
    fn test_compile_markdown_includes_limitations_section_for_failed() {
        let research_plan = plan(vec![subtask("plan-1-subtask-1", "Background", &[])]);
        let mut execution = SubAgentExecution::pending("exec-1", "plan-1-subtask-1");
        execution.state = SubAgentState::Failed;
        execution.error = Some("timed out".to_string());

        let markdown = compile_markdown(&research_plan, &[execution]);
        assert!(markdown.contains("## Research Limitations"));
        assert!(markdown.contains("Background"));
        assert!(markdown.contains("timed out"));
    }

    #[test]
    fn test_compile_markdown_includes_successful_content() {
        let research_plan = plan(vec![subtask("plan-1-subtask-1", "Background", &[])]);
        let mut execution = SubAgentExecution::pending("exec-1", "plan-1-subtask-1");
        execution.state = SubAgentState::Succeeded;
        execution.result = Some("Rust is a systems language.".to_string());

        let markdown = compile_markdown(&research_plan, &[execution]);
        assert!(markdown.contains("Rust is a systems language."));
        assert!(!markdown.contains("## Research Limitations"));
    }

    /// A sub-agent adapter that records which subtask it ran (by title,
    /// found in the instructions prompt) in call order.
    struct RecordingAdapter {
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl ModelAdapter for RecordingAdapter {
        async fn generate(
            &self,
            messages: &[Message],
            _tools: Option<&[ToolSchema]>,
            _params: &GenerateParams,
            _cancel: &CancellationToken,
        ) -> Result<Envelope, ModelAdapterError> {
            let content = messages.first().map(|m| m.content.clone()).unwrap_or_default();
            let label = if content.contains("working on: Fetch base data") { "a" } else { "b" };
            self.log.lock().unwrap().push(label.to_string());
            Ok(Envelope {
                id: "env".to_string(),
                created_at: Utc::now(),
                model: "test".to_string(),
                choices: vec![EnvelopeChoice {
                    index: 0,
                    message: Message::assistant("done"),
                    finish_reason: FinishReason::Stop,
                    metadata: None,
                }],
                usage: Usage::new(1, 1),
                research_plan: None,
            })
        }

        fn validate_request(&self, _messages: &[Message], _tools: Option<&[ToolSchema]>) -> bool {
            true
        }

        fn capabilities(&self) -> &[Capability] {
            &[]
        }

        fn max_tokens(&self) -> u32 {
            32_000
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_runs_dependent_subtask_only_after_prerequisite_succeeds() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let subagent_adapter: Arc<dyn ModelAdapter> = Arc::new(RecordingAdapter { log: Arc::clone(&log) });
        let planner_adapter: Arc<dyn ModelAdapter> = Arc::clone(&subagent_adapter);
        let coordinator = AgentCoordinator::start(ScalingConfig { min_agents: 2, ..ScalingConfig::default() });

        let orchestrator = ResearchOrchestrator::new(planner_adapter, subagent_adapter, coordinator, None, None, 1);

        let research_plan = plan(vec![
            subtask("a", "Fetch base data", &[]),
            subtask("b", "Build on base data", &["a"]),
        ]);
        let mut executions: Vec<SubAgentExecution> = research_plan
            .subtasks
            .iter()
            .map(|s| SubAgentExecution::pending(format!("{}-agent", s.id), s.id.clone()))
            .collect();

        let cancel = CancellationToken::new();
        orchestrator.execute(&research_plan, &mut executions, &cancel).await;

        assert!(executions.iter().all(|e| e.state == SubAgentState::Succeeded));

        let order = log.lock().unwrap().clone();
        let a_pos = order.iter().position(|l| l == "a").expect("subtask a ran");
        let b_pos = order.iter().position(|l| l == "b").expect("subtask b ran");
        assert!(a_pos < b_pos, "dependent subtask b ran before its prerequisite a: {order:?}");
    }

    /// A model adapter that always returns the same fixed content, used to
    /// drive `ResearchOrchestrator::plan` against a canned planner response.
    struct StaticJsonAdapter {
        content: String,
    }

    #[async_trait::async_trait]
    impl ModelAdapter for StaticJsonAdapter {
        async fn generate(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolSchema]>,
            _params: &GenerateParams,
            _cancel: &CancellationToken,
        ) -> Result<Envelope, ModelAdapterError> {
            Ok(Envelope {
                id: "env".to_string(),
                created_at: Utc::now(),
                model: "test".to_string(),
                choices: vec![EnvelopeChoice {
                    index: 0,
                    message: Message::assistant(self.content.clone()),
                    finish_reason: FinishReason::Stop,
                    metadata: None,
                }],
                usage: Usage::new(1, 1),
                research_plan: None,
            })
        }

        fn validate_request(&self, _messages: &[Message], _tools: Option<&[ToolSchema]>) -> bool {
            true
        }

        fn capabilities(&self) -> &[Capability] {
            &[]
        }

        fn max_tokens(&self) -> u32 {
            128_000
        }
    }

    #[tokio::test]
    async fn test_plan_remaps_planner_dependency_ids_onto_generated_subtask_ids() {
        let json = r#"{
            "title": "t",
            "description": "d",
            "subtasks": [
                {"id": "base", "title": "Fetch base data", "description": "d", "instructions": "i", "estimated_duration": 60, "tools_required": [], "dependencies": []},
                {"id": "derived", "title": "Build on base data", "description": "d", "instructions": "i", "estimated_duration": 60, "tools_required": [], "dependencies": ["base"]}
            ],
            "estimated_agents": 2,
            "estimated_duration": 600
        }"#;
        let planner_adapter: Arc<dyn ModelAdapter> = Arc::new(StaticJsonAdapter { content: json.to_string() });
        let subagent_adapter: Arc<dyn ModelAdapter> = Arc::clone(&planner_adapter);
        let coordinator = AgentCoordinator::start(ScalingConfig { min_agents: 0, ..ScalingConfig::default() });
        let orchestrator = ResearchOrchestrator::new(planner_adapter, subagent_adapter, coordinator, None, None, 1);

        let cancel = CancellationToken::new();
        let research_plan = orchestrator.plan_only("anything", &cancel).await.expect("plan parses");

        assert_eq!(research_plan.subtasks.len(), 2);
        let base_id = research_plan.subtasks[0].id.clone();
        let derived_deps: Vec<String> = research_plan.subtasks[1].dependencies.iter().cloned().collect();
        assert_eq!(derived_deps, vec![base_id.clone()]);
        assert_ne!(base_id, "base", "id should be regenerated under the plan's namespace, not reused verbatim");
        assert!(!research_plan.has_cyclic_dependencies());
    }

    #[test]
    fn test_plan_json_remaps_planner_dependency_ids_to_generated_subtask_ids() {
        let json = r#"{
            "title": "t",
            "description": "d",
            "subtasks": [
                {"id": "base", "title": "Fetch base data", "description": "d", "instructions": "i", "estimated_duration": 60, "tools_required": [], "dependencies": []},
                {"id": "derived", "title": "Build on base data", "description": "d", "instructions": "i", "estimated_duration": 60, "tools_required": [], "dependencies": ["base"]}
            ],
            "estimated_agents": 2,
            "estimated_duration": 600
        }"#;
        let parsed: PlanJson = serde_json::from_str(json).expect("valid plan json");
        assert_eq!(parsed.subtasks[0].id, "base");
        assert_eq!(parsed.subtasks[1].dependencies, vec!["base".to_string()]);
    }
}
