//! Agent Coordinator (C8): a bounded worker pool with priority dispatch and
//! utilization-driven horizontal scaling (§4.8). The Research Orchestrator
//! submits one job per sub-agent execution; this service owns how many
//! workers run concurrently and in what order they drain the queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::errors::OrchestratorError;

/// A unit of work the coordinator dispatches to a worker. Receives the
/// global shutdown token so long-running jobs can observe cancellation.
pub type Job = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;
type JobFuture = Pin<Box<dyn Future<Output = Result<Value, OrchestratorError>> + Send>>;

/// Wraps an async closure as a [`Job`].
pub fn job<F, Fut>(f: F) -> Job
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, OrchestratorError>> + Send + 'static,
{
    Box::new(move |cancel| Box::pin(f(cancel)))
}

/// Tunables for the worker pool and its scale-up/scale-down thresholds
/// (§4.8, §6). Defaults match the documented configuration.
#[derive(Debug, Clone)]
pub struct ScalingConfig {
    pub min_agents: usize,
    pub max_agents: usize,
    pub scale_up_utilization: f64,
    pub scale_up_queue_size: usize,
    pub scale_up_wait_secs: f64,
    pub scale_down_utilization: f64,
    pub scale_down_queue_size: usize,
    pub scale_down_idle_agents: usize,
    pub monitoring_interval: Duration,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_agents: 2,
            max_agents: 10,
            scale_up_utilization: 0.8,
            scale_up_queue_size: 5,
            scale_up_wait_secs: 2.0,
            scale_down_utilization: 0.3,
            scale_down_queue_size: 2,
            scale_down_idle_agents: 2,
            monitoring_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentStatus {
    Idle,
    Busy,
}

struct AgentRecord {
    status: AgentStatus,
    tasks_completed: u64,
    tasks_failed: u64,
    avg_task_seconds: f64,
    cancel: CancellationToken,
}

impl AgentRecord {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            status: AgentStatus::Idle,
            tasks_completed: 0,
            tasks_failed: 0,
            avg_task_seconds: 0.0,
            cancel,
        }
    }

    fn success_rate(&self) -> f64 {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / total as f64
        }
    }

    /// `efficiency = 0.7*successRate + 0.3*speedScore`, `speedScore =
    /// min(1, 10/avgTaskSeconds)` (§4.8). An agent that hasn't finished a
    /// task yet is scored as perfectly efficient so it isn't the first
    /// picked for scale-down.
    fn efficiency_score(&self) -> f64 {
        if self.avg_task_seconds <= 0.0 {
            return 1.0;
        }
        let speed_score = (10.0 / self.avg_task_seconds).min(1.0);
        self.success_rate() * 0.7 + speed_score * 0.3
    }
}

/// A point-in-time view of pool health, used to decide scaling actions.
#[derive(Debug, Clone, Copy)]
pub struct ScalingSnapshot {
    pub total_agents: usize,
    pub active_agents: usize,
    pub idle_agents: usize,
    pub queue_size: usize,
    pub avg_wait_secs: f64,
}

impl ScalingSnapshot {
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.total_agents == 0 {
            0.0
        } else {
            self.active_agents as f64 / self.total_agents as f64
        }
    }

    fn needs_scale_up(&self, config: &ScalingConfig) -> bool {
        self.utilization() >= config.scale_up_utilization
            && self.queue_size > config.scale_up_queue_size
            && self.avg_wait_secs > config.scale_up_wait_secs
    }

    fn needs_scale_down(&self, config: &ScalingConfig) -> bool {
        self.utilization() <= config.scale_down_utilization
            && self.queue_size < config.scale_down_queue_size
            && self.idle_agents > config.scale_down_idle_agents
    }
}

struct QueuedJob {
    id: String,
    priority: i32,
    enqueued_at: Instant,
    timeout: Duration,
    job: Job,
    reply: oneshot::Sender<Result<Value, OrchestratorError>>,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for QueuedJob {}

/// Ordered by `(-priority, enqueueTime)` (§4.8): higher priority first,
/// ties broken FIFO by enqueue time.
impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
    }
}
impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded pool of workers draining a priority queue, scaling itself
/// between `min_agents` and `max_agents` based on observed utilization.
pub struct AgentCoordinator {
    config: ScalingConfig,
    queue: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
    agents: Mutex<HashMap<String, AgentRecord>>,
    avg_wait_secs: Mutex<f64>,
    agent_seq: AtomicU64,
    shutdown: CancellationToken,
}

impl AgentCoordinator {
    /// Starts the pool with `config.min_agents` workers plus a background
    /// scaling loop, returning a handle shared by every caller.
    pub fn start(config: ScalingConfig) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            agents: Mutex::new(HashMap::new()),
            avg_wait_secs: Mutex::new(0.0),
            agent_seq: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            config,
        });

        let min_agents = coordinator.config.min_agents;
        for _ in 0..min_agents {
            coordinator.clone().spawn_agent();
        }

        let scaling_handle = Arc::clone(&coordinator);
        let interval = coordinator.config.monitoring_interval * 2;
        tokio::spawn(async move { scaling_handle.scaling_loop(interval).await });

        coordinator
    }

    /// Submit one job at `priority` with a per-job `timeout`, returning its
    /// eventual result. `id` is carried through tracing only.
    pub async fn run(
        &self,
        id: impl Into<String>,
        priority: i32,
        timeout: Duration,
        job: Job,
    ) -> Result<Value, OrchestratorError> {
        let (reply, receiver) = oneshot::channel();
        {
            let mut queue = self.queue.lock().await;
            queue.push(QueuedJob {
                id: id.into(),
                priority,
                enqueued_at: Instant::now(),
                timeout,
                job,
                reply,
            });
        }
        self.notify.notify_one();

        receiver
            .await
            .unwrap_or_else(|_| Err(OrchestratorError::Internal("coordinator dropped job before completion".to_string())))
    }

    /// Cancels every in-flight worker and prevents new dispatch. Queued
    /// jobs that never reached a worker resolve their receiver on drop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.notify.notify_waiters();
    }

    #[must_use]
    pub async fn snapshot(&self) -> ScalingSnapshot {
        let agents = self.agents.lock().await;
        let total_agents = agents.len();
        let active_agents = agents.values().filter(|a| a.status == AgentStatus::Busy).count();
        ScalingSnapshot {
            total_agents,
            active_agents,
            idle_agents: total_agents - active_agents,
            queue_size: self.queue.lock().await.len(),
            avg_wait_secs: *self.avg_wait_secs.lock().await,
        }
    }

    fn spawn_agent(self: Arc<Self>) {
        let agent_id = format!("agent-{}", self.agent_seq.fetch_add(1, AtomicOrdering::Relaxed));
        let cancel = self.shutdown.child_token();
        tokio::spawn({
            let coordinator = Arc::clone(&self);
            let agent_id = agent_id.clone();
            let cancel = cancel.clone();
            async move { coordinator.worker_loop(agent_id, cancel).await }
        });
        info!(agent_id = %agent_id, "coordinator spawned agent");
    }

    #[instrument(skip(self, cancel))]
    async fn worker_loop(self: Arc<Self>, agent_id: String, cancel: CancellationToken) {
        self.agents.lock().await.insert(agent_id.clone(), AgentRecord::new(cancel.clone()));

        loop {
            let next = self.queue.lock().await.pop();
            let Some(queued) = next else {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = self.notify.notified() => continue,
                }
            };

            self.record_wait(queued.enqueued_at.elapsed()).await;
            self.set_status(&agent_id, AgentStatus::Busy).await;

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(OrchestratorError::Internal("agent shutting down".to_string())),
                result = tokio::time::timeout(queued.timeout, (queued.job)(self.shutdown.clone())) => match result {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => Err(OrchestratorError::Timeout),
                },
            };
            let elapsed = started.elapsed();

            self.record_completion(&agent_id, outcome.is_ok(), elapsed).await;
            self.set_status(&agent_id, AgentStatus::Idle).await;
            let _ = queued.reply.send(outcome);

            if cancel.is_cancelled() {
                break;
            }
        }

        self.agents.lock().await.remove(&agent_id);
        info!(agent_id = %agent_id, "coordinator retired agent");
    }

    async fn set_status(&self, agent_id: &str, status: AgentStatus) {
        if let Some(record) = self.agents.lock().await.get_mut(agent_id) {
            record.status = status;
        }
    }

    /// EMA with alpha=0.2, matching `avg_task_seconds` (§4.8).
    async fn record_completion(&self, agent_id: &str, succeeded: bool, elapsed: Duration) {
        let mut agents = self.agents.lock().await;
        let Some(record) = agents.get_mut(agent_id) else { return };
        if succeeded {
            record.tasks_completed += 1;
        } else {
            record.tasks_failed += 1;
        }
        let seconds = elapsed.as_secs_f64();
        record.avg_task_seconds = if record.avg_task_seconds == 0.0 {
            seconds
        } else {
            record.avg_task_seconds * 0.8 + seconds * 0.2
        };
    }

    async fn record_wait(&self, wait: Duration) {
        let mut avg = self.avg_wait_secs.lock().await;
        let seconds = wait.as_secs_f64();
        *avg = if *avg == 0.0 { seconds } else { *avg * 0.8 + seconds * 0.2 };
    }

    async fn scaling_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return,
                _ = ticker.tick() => self.check_scaling().await,
            }
        }
    }

    async fn check_scaling(self: &Arc<Self>) {
        let snapshot = self.snapshot().await;
        if snapshot.needs_scale_up(&self.config) && snapshot.total_agents < self.config.max_agents {
            Arc::clone(self).scale_up().await;
        } else if snapshot.needs_scale_down(&self.config) && snapshot.total_agents > self.config.min_agents {
            self.scale_down().await;
        }
    }

    async fn scale_up(self: Arc<Self>) {
        info!("coordinator scaling up");
        self.spawn_agent();
    }

    async fn scale_down(&self) {
        let victim = {
            let agents = self.agents.lock().await;
            agents
                .iter()
                .filter(|(_, record)| record.status == AgentStatus::Idle)
                .min_by(|(_, a), (_, b)| a.efficiency_score().partial_cmp(&b.efficiency_score()).unwrap_or(Ordering::Equal))
                .map(|(id, record)| (id.clone(), record.cancel.clone()))
        };
        let Some((agent_id, cancel)) = victim else { return };
        warn!(agent_id = %agent_id, "coordinator scaling down");
        cancel.cancel();
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ScalingConfig {
        ScalingConfig {
            min_agents: 1,
            max_agents: 4,
            monitoring_interval: Duration::from_millis(20),
            ..ScalingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_single_job_completes_and_returns_value() {
        let coordinator = AgentCoordinator::start(cfg());
        let result = coordinator
            .run("job-1", 0, Duration::from_secs(1), job(|_cancel| async { Ok(serde_json::json!({"ok": true})) }))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_job_timeout_surfaces_as_timeout_error() {
        let coordinator = AgentCoordinator::start(cfg());
        let result = coordinator
            .run(
                "job-1",
                0,
                Duration::from_millis(10),
                job(|_cancel| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(serde_json::json!({}))
                }),
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError::Timeout)));
    }

    #[tokio::test]
    async fn test_higher_priority_job_runs_first() {
        // Single-worker pool: submit low then high priority while the
        // worker is occupied, and confirm completion order follows
        // priority rather than submission order.
        let coordinator = AgentCoordinator::start(ScalingConfig {
            min_agents: 1,
            max_agents: 1,
            ..cfg()
        });
        let order = Arc::new(Mutex::new(Vec::new()));

        let blocker = {
            let order = Arc::clone(&order);
            coordinator.run(
                "blocker",
                0,
                Duration::from_secs(1),
                job(move |_cancel| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    order.lock().await.push("blocker");
                    Ok(serde_json::Value::Null)
                }),
            )
        };

        tokio::time::sleep(Duration::from_millis(10)).await;

        let low = {
            let order = Arc::clone(&order);
            coordinator.run(
                "low",
                0,
                Duration::from_secs(1),
                job(move |_cancel| async move {
                    order.lock().await.push("low");
                    Ok(serde_json::Value::Null)
                }),
            )
        };
        let high = {
            let order = Arc::clone(&order);
            coordinator.run(
                "high",
                10,
                Duration::from_secs(1),
                job(move |_cancel| async move {
                    order.lock().await.push("high");
                    Ok(serde_json::Value::Null)
                }),
            )
        };

        let _ = tokio::join!(blocker, low, high);
        let order = order.lock().await;
        assert_eq!(order.as_slice(), ["blocker", "high", "low"]);
    }

    #[tokio::test]
    async fn test_efficiency_score_favors_fast_reliable_agent() {
        let fast = AgentRecord {
            status: AgentStatus::Idle,
            tasks_completed: 10,
            tasks_failed: 0,
            avg_task_seconds: 2.0,
            cancel: CancellationToken::new(),
        };
        let slow_flaky = AgentRecord {
            status: AgentStatus::Idle,
            tasks_completed: 5,
            tasks_failed: 5,
            avg_task_seconds: 40.0,
            cancel: CancellationToken::new(),
        };
        assert!(fast.efficiency_score() > slow_flaky.efficiency_score());
    }

    #[tokio::test]
    async fn test_ema_avg_task_seconds_matches_hand_computed_sequence() {
        let coordinator = AgentCoordinator::start(ScalingConfig { min_agents: 0, ..ScalingConfig::default() });
        coordinator
            .agents
            .lock()
            .await
            .insert("agent-x".to_string(), AgentRecord::new(CancellationToken::new()));

        coordinator.record_completion("agent-x", true, Duration::from_secs_f64(10.0)).await;
        // first sample seeds the average directly.
        assert!((coordinator.agents.lock().await["agent-x"].avg_task_seconds - 10.0).abs() < 1e-9);

        coordinator.record_completion("agent-x", true, Duration::from_secs_f64(20.0)).await;
        // 10.0*0.8 + 20.0*0.2 = 12.0
        assert!((coordinator.agents.lock().await["agent-x"].avg_task_seconds - 12.0).abs() < 1e-9);

        coordinator.record_completion("agent-x", false, Duration::from_secs_f64(5.0)).await;
        // 12.0*0.8 + 5.0*0.2 = 10.6
        let agents = coordinator.agents.lock().await;
        let record = &agents["agent-x"];
        assert!((record.avg_task_seconds - 10.6).abs() < 1e-9);
        assert_eq!(record.tasks_completed, 2);
        assert_eq!(record.tasks_failed, 1);
    }

    #[test]
    fn test_scale_up_boundary_requires_all_three_conditions() {
        let config = ScalingConfig::default();
        let snapshot = ScalingSnapshot {
            total_agents: 5,
            active_agents: 4,
            idle_agents: 1,
            queue_size: 6,
            avg_wait_secs: 2.1,
        };
        assert!(snapshot.needs_scale_up(&config));

        let not_enough_queue = ScalingSnapshot { queue_size: 5, ..snapshot };
        assert!(!not_enough_queue.needs_scale_up(&config));

        let not_enough_wait = ScalingSnapshot { avg_wait_secs: 2.0, ..snapshot };
        assert!(!not_enough_wait.needs_scale_up(&config));
    }

    #[test]
    fn test_scale_down_boundary_requires_all_three_conditions() {
        let config = ScalingConfig::default();
        let snapshot = ScalingSnapshot {
            total_agents: 6,
            active_agents: 1,
            idle_agents: 5,
            queue_size: 1,
            avg_wait_secs: 0.0,
        };
        assert!(snapshot.needs_scale_down(&config));

        let too_busy = ScalingSnapshot { active_agents: 3, idle_agents: 3, ..snapshot };
        assert!(!too_busy.needs_scale_down(&config));
    }
}
