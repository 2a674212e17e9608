//! The RAG collaborator port: an opaque `ingest`/`retrieve` service treated,
//! per §1's scope note, only as an external interface — its vector-store
//! internals are out of scope for this crate.

use async_trait::async_trait;

/// Whether a retrieval call should favor breadth (`research`) or a quick
/// top-K lookup (`general`), per §4.6 step 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    General,
    Research,
}

/// One retrieved chunk.
#[derive(Debug, Clone)]
pub struct RagChunk {
    pub content: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait RagCollaborator: Send + Sync {
    /// Ingest `text` with `metadata`, returning an opaque document id.
    async fn ingest(&self, text: &str, metadata: serde_json::Value) -> anyhow::Result<String>;

    /// Retrieve up to `top_k` chunks relevant to `query`.
    async fn retrieve(
        &self,
        query: &str,
        mode: RetrievalMode,
        top_k: usize,
    ) -> anyhow::Result<Vec<RagChunk>>;
}
