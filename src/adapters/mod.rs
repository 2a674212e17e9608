//! Model-family adapters (C2) and the built-in tools (part of C4) that
//! wrap them. Each adapter owns one [`crate::infrastructure::provider::ProviderClient`]
//! and translates between the core's normalized types and that provider's
//! wire contract exactly once, at this boundary.

pub mod chat;
pub mod code;
pub mod embedding;
pub mod multimodal;
pub mod reranker;
pub mod search;

pub use chat::ChatAdapter;
pub use code::{CodeAdapter, CoderTool};
pub use embedding::EmbeddingAdapter;
pub use multimodal::{MultimodalAdapter, MultimodalTool};
pub use reranker::RerankerAdapter;
pub use search::SearchTool;
