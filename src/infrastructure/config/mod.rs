//! Configuration management infrastructure (A1).
//!
//! Hierarchical configuration using `figment`:
//! - YAML file loading (`orchestrator.yaml`)
//! - Environment variable overrides (`ORCH_` prefix, `__` nesting)
//! - Validation at load time
//! - Type-safe config structs, including the provider table C1/C2 consume

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, OrchestratorConfig, ProviderSpec};
