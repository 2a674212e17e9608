//! Process entry point: loads configuration, initializes logging, wires
//! one adapter per logical model from the configured provider table, and
//! assembles the composed services (C3-C9) behind an [`orchestrator_core::services::ChatCore`].
//!
//! This binary has no transport of its own — §1 places the HTTP façade and
//! authentication outside the core's scope. What follows is the reference
//! wiring a surrounding service would perform before handing requests to
//! [`ChatCore::complete`] and [`ResearchOrchestrator::conduct`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use orchestrator_core::adapters::{
    ChatAdapter, CodeAdapter, CoderTool, EmbeddingAdapter, MultimodalAdapter, MultimodalTool,
    RerankerAdapter, SearchTool,
};
use orchestrator_core::domain::models::LogicalModel;
use orchestrator_core::domain::ports::ModelAdapter;
use orchestrator_core::infrastructure::config::{ConfigLoader, OrchestratorConfig, ProviderSpec};
use orchestrator_core::infrastructure::logging::LoggerImpl;
use orchestrator_core::infrastructure::provider::{ProviderClient, ProviderClientConfig, RetryPolicy};
use orchestrator_core::services::{
    AgentCoordinator, ChatCore, DiversityValidator, ResearchOrchestrator, ResourceMonitor,
    ScalingConfig, ToolExecutor, ToolRegistry,
};

/// Builds one [`ProviderClient`] + [`RetryPolicy`] pair for `logical`,
/// looking up its provider row by the logical model's own name
/// (`ORCH_PROVIDERS__CHAT_LARGE__BASE_URL`, etc.) — the convention this
/// deployment expects of `orchestrator.yaml`.
fn provider_for(config: &OrchestratorConfig, logical: LogicalModel) -> Result<(ProviderClient, RetryPolicy)> {
    let key = logical.as_str();
    let spec: &ProviderSpec = config
        .providers
        .get(key)
        .with_context(|| format!("no provider configured for logical model '{key}'"))?;

    let client_config = ProviderClientConfig {
        name: spec.name.clone(),
        base_url: spec.base_url.clone(),
        auth_token: spec.api_key.clone(),
        request_timeout: Duration::from_secs(spec.timeout_secs),
        rate_limit_rps: 10.0,
    };
    let client = ProviderClient::new(client_config).with_context(|| format!("building provider client for '{key}'"))?;
    let retry = RetryPolicy::new(
        spec.max_retries,
        Duration::from_millis(spec.backoff_base_ms),
        Duration::from_millis(spec.max_backoff_ms),
    );
    Ok((client, retry))
}

/// Assembles the C2 adapter table, the C4 tool registry, and the
/// resulting [`ChatCore`] from a loaded [`OrchestratorConfig`]. Providers
/// absent from the config simply leave that logical model or tool
/// unavailable rather than failing startup — a deployment may run with
/// only a subset of the six logical models configured.
fn build_chat_core(config: &OrchestratorConfig) -> Result<(ChatCore, Arc<ResourceMonitor>)> {
    let mut adapters: HashMap<LogicalModel, Arc<dyn ModelAdapter>> = HashMap::new();
    let mut tools: Vec<Arc<dyn orchestrator_core::domain::ports::Tool>> = Vec::new();

    if let Ok((client, retry)) = provider_for(config, LogicalModel::ChatLarge) {
        adapters.insert(
            LogicalModel::ChatLarge,
            Arc::new(ChatAdapter::new(LogicalModel::ChatLarge, "chat-large", client, retry)),
        );
    }
    if let Ok((client, retry)) = provider_for(config, LogicalModel::ChatLight) {
        adapters.insert(
            LogicalModel::ChatLight,
            Arc::new(ChatAdapter::new(LogicalModel::ChatLight, "chat-light", client, retry)),
        );
    }
    if let Ok((client, retry)) = provider_for(config, LogicalModel::ChatCode) {
        let code_adapter = Arc::new(CodeAdapter::new("chat-code", client, retry));
        tools.push(Arc::new(CoderTool::new(Arc::clone(&code_adapter))));
        adapters.insert(LogicalModel::ChatCode, code_adapter);
    }
    if let Ok((client, retry)) = provider_for(config, LogicalModel::Multimodal) {
        let multimodal_adapter = Arc::new(MultimodalAdapter::new("multimodal", client, retry));
        tools.push(Arc::new(MultimodalTool::new(Arc::clone(&multimodal_adapter))));
        adapters.insert(LogicalModel::Multimodal, multimodal_adapter);
    }
    if let Ok((client, _retry)) = provider_for(config, LogicalModel::Embedding) {
        adapters.insert(LogicalModel::Embedding, Arc::new(EmbeddingAdapter::new("embedding", client)));
    }
    if let Ok((client, _retry)) = provider_for(config, LogicalModel::Reranker) {
        adapters.insert(LogicalModel::Reranker, Arc::new(RerankerAdapter::new("reranker", client)));
    }

    if let Some(search_spec) = config.providers.get("light-search") {
        let client = ProviderClient::new(ProviderClientConfig {
            name: search_spec.name.clone(),
            base_url: search_spec.base_url.clone(),
            auth_token: search_spec.api_key.clone(),
            request_timeout: Duration::from_secs(search_spec.timeout_secs),
            rate_limit_rps: 10.0,
        })?;
        tools.push(Arc::new(SearchTool::light("fast-search", client)));
    }
    if let Some(search_spec) = config.providers.get("medium-search") {
        let client = ProviderClient::new(ProviderClientConfig {
            name: search_spec.name.clone(),
            base_url: search_spec.base_url.clone(),
            auth_token: search_spec.api_key.clone(),
            request_timeout: Duration::from_secs(search_spec.timeout_secs),
            rate_limit_rps: 10.0,
        })?;
        tools.push(Arc::new(SearchTool::medium("reasoning-search", client)));
    }

    let registry = Arc::new(ToolRegistry::new(tools));
    let diversity = DiversityValidator::new(config.diversity_threshold);
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), diversity));
    let resource_monitor = Arc::new(ResourceMonitor::new(config.max_context_tokens));

    let research = match (adapters.get(&LogicalModel::ChatLarge).cloned(), adapters.get(&LogicalModel::ChatLight).cloned()) {
        (Some(planner), Some(subagent)) => {
            let scaling = ScalingConfig {
                min_agents: config.min_agents as usize,
                max_agents: config.max_agents as usize,
                monitoring_interval: Duration::from_secs(5),
                ..ScalingConfig::default()
            };
            let coordinator = AgentCoordinator::start(scaling);
            Some(Arc::new(ResearchOrchestrator::new(
                planner,
                subagent,
                coordinator,
                None,
                None,
                config.research_result_ttl_hours,
            )))
        }
        _ => {
            warn!("chat-large or chat-light not configured; deep-research orchestrator disabled");
            None
        }
    };

    let chat_core = ChatCore::new(
        adapters,
        registry,
        executor,
        Arc::clone(&resource_monitor),
        None,
        research,
        config.tool_iteration_cap,
    );
    Ok((chat_core, resource_monitor))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load().context("loading configuration")?;
    let _logger = LoggerImpl::init(&config.logging).context("initializing logging")?;

    info!(
        min_agents = config.min_agents,
        max_agents = config.max_agents,
        providers = config.providers.len(),
        "orchestrator core starting"
    );

    let (_chat_core, resource_monitor) = build_chat_core(&config).context("wiring chat core from configuration")?;

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, draining in-flight work");
            shutdown_signal.cancel();
        }
    });

    tokio::spawn(resource_monitor.run_sampler(Duration::from_secs(30), shutdown.clone()));

    shutdown.cancelled().await;
    info!("orchestrator core shut down");
    Ok(())
}
