//! Orchestrator core: a multi-model AI orchestration library.
//!
//! Routes chat-completion requests to a heterogeneous set of remote LLM
//! providers, invokes tools (code assistant, multimodal analysis, web
//! search) on their behalf, and runs a deep-research workflow that fans
//! work out across bounded sub-agent workers.
//!
//! This crate is a coordinator, not a server: it has no opinion on
//! transport, authentication, or persistence. [`main`](../bin/orchestrator-core)
//! shows one way to wire it into a running process; any other front end —
//! an HTTP façade, a CLI, a test harness — composes the same pieces.
//!
//! Layering, inside out:
//! - [`domain`] — normalized types, the error taxonomy, and the port
//!   traits every adapter satisfies.
//! - [`adapters`] — per-model-family translators to provider wire formats
//!   (C2), plus the built-in tools they back (C4).
//! - [`infrastructure`] — the HTTP client, config loader, and logging
//!   stack the adapters and services depend on.
//! - [`services`] — the seven composed components: diversity validation
//!   (C3), the tool registry and executor (C4-C5), chat core (C6), the
//!   research orchestrator (C7), the agent coordinator (C8), and the
//!   resource monitor (C9).

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::{OrchestratorError, OrchestratorResult};
