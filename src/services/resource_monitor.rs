//! Resource Monitor (C9): enforces the global 500k-token reservation
//! ceiling and surfaces memory pressure (§4.9).
//!
//! The reservation counter and the per-context map are guarded by the same
//! mutex (§5's "Shared-resource policy") so the invariant
//! `sum(per_context.values()) == total` never observably breaks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::models::{ContextUsage, ModelKind};

/// Fraction of the ceiling at which a [`PressureLevel::Warning`] is raised.
const WARNING_THRESHOLD: f64 = 0.8;
/// Fraction of the ceiling at which a [`PressureLevel::Critical`] is raised.
const CRITICAL_THRESHOLD: f64 = 0.9;

/// Outcome of a [`ResourceMonitor::reserve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Ok,
    Rejected { requested: u64, available: u64 },
}

/// Pressure signal [`ResourceMonitor::sample`] surfaces to C8/C6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Normal,
    Warning,
    Critical,
}

struct State {
    total_tokens: u64,
    per_context: HashMap<String, u64>,
}

/// Tracks in-flight context-token reservations against a hard ceiling.
pub struct ResourceMonitor {
    max_context_tokens: u64,
    state: Mutex<State>,
}

impl ResourceMonitor {
    #[must_use]
    pub fn new(max_context_tokens: u64) -> Self {
        Self {
            max_context_tokens,
            state: Mutex::new(State {
                total_tokens: 0,
                per_context: HashMap::new(),
            }),
        }
    }

    /// `reserve(contextId, tokens, modelKind) -> ok | rejected` (§4.9). The
    /// `model_kind` only informs the reporting-only memory estimate; it
    /// plays no part in the hard token cap.
    pub async fn reserve(&self, context_id: impl Into<String>, tokens: u64, model_kind: ModelKind) -> ReserveOutcome {
        let mut state = self.state.lock().await;
        let available = self.max_context_tokens.saturating_sub(state.total_tokens);
        if tokens > available {
            warn!(requested = tokens, available, "resource monitor rejected reservation");
            return ReserveOutcome::Rejected { requested: tokens, available };
        }

        let context_id = context_id.into();
        state.total_tokens += tokens;
        state.per_context.insert(context_id, tokens);
        info!(
            tokens,
            memory_estimate_bytes = tokens * model_kind.bytes_per_token(),
            total_tokens = state.total_tokens,
            "resource monitor reserved tokens"
        );
        ReserveOutcome::Ok
    }

    /// `release(contextId)` (§4.9). Runs unconditionally on every Chat Core
    /// exit path; releasing an unknown or already-released context is a
    /// no-op, never an error.
    pub async fn release(&self, context_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(tokens) = state.per_context.remove(context_id) {
            state.total_tokens = state.total_tokens.saturating_sub(tokens);
            info!(tokens, total_tokens = state.total_tokens, "resource monitor released tokens");
        }
    }

    /// `snapshot() -> ContextUsage` (§4.9).
    pub async fn snapshot(&self) -> ContextUsage {
        let state = self.state.lock().await;
        ContextUsage {
            total_tokens: state.total_tokens,
            per_context: state.per_context.clone(),
        }
    }

    /// Classify current usage against the 80%/90% thresholds, for the
    /// periodic sampler to log as a warning or critical alert.
    pub async fn pressure(&self) -> PressureLevel {
        let state = self.state.lock().await;
        let ratio = state.total_tokens as f64 / self.max_context_tokens as f64;
        if ratio >= CRITICAL_THRESHOLD {
            PressureLevel::Critical
        } else if ratio >= WARNING_THRESHOLD {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }

    /// Runs the periodic sampler (§4.9) until `cancel` fires: every
    /// `interval`, logs a snapshot and any threshold crossing.
    pub async fn run_sampler(self: Arc<Self>, interval: std::time::Duration, cancel: tokio_util::sync::CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let snapshot = self.snapshot().await;
                    match self.pressure().await {
                        PressureLevel::Critical => warn!(
                            total_tokens = snapshot.total_tokens,
                            ceiling = self.max_context_tokens,
                            "resource monitor: critical token pressure"
                        ),
                        PressureLevel::Warning => warn!(
                            total_tokens = snapshot.total_tokens,
                            ceiling = self.max_context_tokens,
                            "resource monitor: elevated token pressure"
                        ),
                        PressureLevel::Normal => info!(total_tokens = snapshot.total_tokens, "resource monitor: sample"),
                    }
                }
            }
        }
    }
}
