//! AppState construction and background-task spawning.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use strand_conversations::ConversationStore;
use strand_domain::config::{Config, ConfigSeverity};
use strand_graphs::{DeploymentService, GraphStore, VersionStore};
use strand_runtime::checkpoint::{CheckpointStore, FileCheckpointStore};
use strand_runtime::llm::HttpLlmClientFactory;
use strand_runtime::resolver::GraphResolver;
use strand_runtime::tool::ToolRegistry;

use crate::runtime::copilot::{CopilotService, MemoryKv};
use crate::runtime::notify::NotificationBus;
use crate::runtime::tasks::TaskManager;
use crate::state::AppState;

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let state_path = &config.storage.state_path;

    // ── Stores ───────────────────────────────────────────────────────
    let graphs = Arc::new(GraphStore::new(state_path).context("initializing graph store")?);
    let versions =
        Arc::new(VersionStore::new(state_path).context("initializing deployment version store")?);
    let deployments = Arc::new(DeploymentService::new(graphs.clone(), versions.clone()));
    let conversations =
        Arc::new(ConversationStore::new(state_path).context("initializing conversation store")?);
    let checkpoints: Arc<dyn CheckpointStore> =
        Arc::new(FileCheckpointStore::new(state_path).context("initializing checkpoint store")?);
    tracing::info!(path = %state_path.display(), "stores ready");

    // ── Execution ────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    let resolver = Arc::new(GraphResolver::new(
        graphs.clone(),
        checkpoints.clone(),
        tools.clone(),
        Arc::new(HttpLlmClientFactory),
    ));
    let tasks = Arc::new(TaskManager::new());
    let notifier = Arc::new(NotificationBus::new());
    tracing::info!("execution services ready");

    // ── Copilot KV ───────────────────────────────────────────────────
    let kv = Arc::new(MemoryKv::new());
    let copilot = Arc::new(CopilotService::new(
        kv,
        Duration::from_secs(config.copilot.kv_ttl_secs),
    ));
    tracing::info!(ttl_secs = config.copilot.kv_ttl_secs, "copilot service ready");

    // ── API token (read once, hash for constant-time comparison) ─────
    // Priority: config.server.api_token > env var (config.server.api_token_env)
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        let token = config
            .server
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| ("config".to_string(), t.to_string()))
            .or_else(|| {
                std::env::var(env_var)
                    .ok()
                    .filter(|t| !t.is_empty())
                    .map(|t| (format!("env:{env_var}"), t))
            });
        match token {
            Some((source, t)) => {
                tracing::info!(source = %source, "API bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(
                    "API bearer-token auth DISABLED — set server.api_token in strand.toml or {env_var} env var"
                );
                None
            }
        }
    };

    Ok(AppState {
        config,
        graphs,
        versions,
        deployments,
        conversations,
        checkpoints,
        resolver,
        tools,
        tasks,
        notifier,
        copilot,
        api_token_hash,
    })
}

/// Spawn the long-running background tasks (store flushes, notification
/// channel pruning, copilot KV sweeping). Call after [`build_app_state`]
/// when running the HTTP server.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic store flush ─────────────────────────────────────────
    // Stores write through on mutation; this guards the index files
    // against a crash between the write and the rename.
    {
        let graphs = state.graphs.clone();
        let conversations = state.conversations.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Err(e) = graphs.flush() {
                    tracing::warn!(error = %e, "graph store flush failed");
                }
                if let Err(e) = conversations.flush() {
                    tracing::warn!(error = %e, "conversation store flush failed");
                }
            }
        });
    }

    // ── Periodic notification channel pruning + copilot KV sweep ─────
    {
        let notifier = state.notifier.clone();
        let copilot = state.copilot.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                notifier.prune_idle();
                copilot.kv().sweep().await;
            }
        });
    }

    tracing::info!("background tasks spawned");
}
