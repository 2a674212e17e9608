//! The PDF rendering collaborator port (§4.7 phase 7). Rendering failure
//! degrades the research result, it never fails the research as a whole.

use async_trait::async_trait;

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render `markdown` to a PDF, returning the artifact path.
    async fn render(&self, markdown: &str) -> anyhow::Result<String>;
}
