//! Layered configuration load + validation (A1).
//!
//! Precedence, lowest to highest: compiled-in defaults, an optional
//! `orchestrator.yaml` file, then `ORCH_`-prefixed environment variables
//! (double underscore as the nesting separator, e.g.
//! `ORCH_PROVIDERS__ANTHROPIC__API_KEY`). Provider credentials are read only
//! through this layer — nothing downstream calls `std::env::var` itself.

use std::collections::HashMap;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised validating a loaded [`OrchestratorConfig`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid agent pool bounds: min_agents={min}, max_agents={max} (need 1 <= min <= max)")]
    InvalidAgentBounds { min: u32, max: u32 },

    #[error("diversity_threshold must be in [0, 1], got {0}")]
    InvalidDiversityThreshold(f64),

    #[error("rerank_threshold must be in [0, 1], got {0}")]
    InvalidRerankThreshold(f64),

    #[error("backoff_base_ms ({base}) must be less than max_backoff_ms ({max})")]
    InvalidBackoff { base: u64, max: u64 },

    #[error("provider '{0}' has an empty base_url")]
    EmptyProviderBaseUrl(String),

    #[error("max_context_tokens must be positive")]
    InvalidMaxContextTokens,

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Per-provider row the config layer produces; consumed by C1 to build one
/// `ProviderClient` per remote endpoint and by C2 to route a logical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_provider_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_provider_timeout_secs() -> u64 {
    300
}
fn default_provider_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    300_000
}

/// Process-wide settings, threaded by reference into every service at
/// construction. Covers every tunable in SPEC_FULL.md §6's option table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Coordinator pool lower bound (C8).
    #[serde(default = "default_min_agents")]
    pub min_agents: u32,
    /// Coordinator pool upper bound (C8).
    #[serde(default = "default_max_agents")]
    pub max_agents: u32,
    /// Default sub-agent execution deadline, seconds (C7).
    #[serde(default = "default_agent_timeout_seconds")]
    pub agent_timeout_seconds: u64,
    /// Default sub-agent retry count (C7).
    #[serde(default = "default_agent_max_retries")]
    pub agent_max_retries: u32,
    /// Diversity validator cosine-similarity duplicate threshold (C3).
    #[serde(default = "default_diversity_threshold")]
    pub diversity_threshold: f64,
    /// Reranker minimum retained score (C2 reranker adapter).
    #[serde(default = "default_rerank_threshold")]
    pub rerank_threshold: f64,
    /// Global in-flight token ceiling (C9).
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u64,
    /// Default provider HTTP timeout, seconds (C1).
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_seconds: u64,
    /// Default provider retry count (C1).
    #[serde(default = "default_provider_max_retries")]
    pub provider_max_retries: u32,
    /// Per-chat tool-loop iteration cap (C6).
    #[serde(default = "default_tool_iteration_cap")]
    pub tool_iteration_cap: u32,
    /// Research result cache eviction age, hours (C7).
    #[serde(default = "default_research_result_ttl_hours")]
    pub research_result_ttl_hours: u64,
    /// Logging configuration (ambient stack).
    #[serde(default)]
    pub logging: super::super::logging::LogConfig,
    /// One entry per logical-model-backing provider, keyed by provider name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderSpec>,
}

fn default_min_agents() -> u32 {
    2
}
fn default_max_agents() -> u32 {
    10
}
fn default_agent_timeout_seconds() -> u64 {
    300
}
fn default_agent_max_retries() -> u32 {
    2
}
fn default_diversity_threshold() -> f64 {
    0.8
}
fn default_rerank_threshold() -> f64 {
    0.7
}
fn default_max_context_tokens() -> u64 {
    500_000
}
fn default_tool_iteration_cap() -> u32 {
    8
}
fn default_research_result_ttl_hours() -> u64 {
    24
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_agents: default_min_agents(),
            max_agents: default_max_agents(),
            agent_timeout_seconds: default_agent_timeout_seconds(),
            agent_max_retries: default_agent_max_retries(),
            diversity_threshold: default_diversity_threshold(),
            rerank_threshold: default_rerank_threshold(),
            max_context_tokens: default_max_context_tokens(),
            provider_timeout_seconds: default_provider_timeout_secs(),
            provider_max_retries: default_provider_max_retries(),
            tool_iteration_cap: default_tool_iteration_cap(),
            research_result_ttl_hours: default_research_result_ttl_hours(),
            logging: super::super::logging::LogConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Serialized`)
    /// 2. `orchestrator.yaml` (optional, working directory)
    /// 3. Environment variables (`ORCH_` prefix, `__` nesting separator)
    pub fn load() -> anyhow::Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file("orchestrator.yaml"))
            .merge(Env::prefixed("ORCH_").split("__"))
            .extract()
            .map_err(|e| anyhow::anyhow!("failed to extract configuration: {e}"))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from an explicit YAML file, for tests and
    /// non-default deployment layouts.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("ORCH_").split("__"))
            .extract()
            .map_err(|e| {
                anyhow::anyhow!("failed to load config from {}: {e}", path.as_ref().display())
            })?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading, per SPEC_FULL.md §6's
    /// "Configuration layering" rejection rules.
    pub fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
        if config.min_agents == 0
            || config.max_agents == 0
            || config.min_agents > config.max_agents
        {
            return Err(ConfigError::InvalidAgentBounds {
                min: config.min_agents,
                max: config.max_agents,
            });
        }

        if !(0.0..=1.0).contains(&config.diversity_threshold) {
            return Err(ConfigError::InvalidDiversityThreshold(
                config.diversity_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&config.rerank_threshold) {
            return Err(ConfigError::InvalidRerankThreshold(config.rerank_threshold));
        }

        if config.max_context_tokens == 0 {
            return Err(ConfigError::InvalidMaxContextTokens);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        for provider in config.providers.values() {
            if provider.base_url.is_empty() {
                return Err(ConfigError::EmptyProviderBaseUrl(provider.name.clone()));
            }
            if provider.backoff_base_ms >= provider.max_backoff_ms {
                return Err(ConfigError::InvalidBackoff {
                    base: provider.backoff_base_ms,
                    max: provider.max_backoff_ms,
                });
            }
        }

        Ok(())
    }
}
