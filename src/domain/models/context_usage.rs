//! Per-process context-token accounting, read by the Resource Monitor (C9).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Coarse model category used for the piecewise memory-per-token estimate
/// (§4.9); reporting only, never part of the hard token cap itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    General,
    Embedding,
    Code,
    Multimodal,
}

impl ModelKind {
    /// Bytes-per-token memory estimate, for reporting only.
    #[must_use]
    pub const fn bytes_per_token(self) -> u64 {
        match self {
            Self::General => 2 * 1024,
            Self::Embedding => 1024,
            Self::Code => 3 * 1024,
            Self::Multimodal => 5 * 1024,
        }
    }
}

/// A snapshot of currently-allocated context tokens. `sum(per_context.values())
/// == total` is an invariant the Resource Monitor upholds on every
/// `reserve`/`release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUsage {
    pub total_tokens: u64,
    pub per_context: HashMap<String, u64>,
}
