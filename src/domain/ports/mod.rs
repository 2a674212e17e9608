//! Port traits every infrastructure/adapter implementation satisfies. The
//! domain and service layers depend only on these, never on a concrete
//! adapter, per the Clean-Architecture-style layering this crate follows.

pub mod model_adapter;
pub mod pdf;
pub mod rag;
pub mod tool;

pub use model_adapter::{GenerateParams, ModelAdapter, ModelAdapterError};
pub use pdf::PdfRenderer;
pub use rag::{RagChunk, RagCollaborator, RetrievalMode};
pub use tool::Tool;
