use std::sync::Arc;

use strand_conversations::ConversationStore;
use strand_domain::config::Config;
use strand_domain::llm::LlmParams;
use strand_graphs::{DeploymentService, GraphStore, VersionStore};
use strand_runtime::checkpoint::CheckpointStore;
use strand_runtime::resolver::GraphResolver;
use strand_runtime::tool::ToolRegistry;

use crate::runtime::copilot::CopilotService;
use crate::runtime::notify::NotificationBus;
use crate::runtime::tasks::TaskManager;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Stores** — graphs, deployment versions, conversations, checkpoints
/// - **Execution** — resolver, tool registry, task manager, notification bus
/// - **Secondary** — copilot generation sessions
/// - **Security** — startup-computed API token digest
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Stores ────────────────────────────────────────────────────────
    pub graphs: Arc<GraphStore>,
    pub versions: Arc<VersionStore>,
    pub deployments: Arc<DeploymentService>,
    pub conversations: Arc<ConversationStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,

    // ── Execution ─────────────────────────────────────────────────────
    pub resolver: Arc<GraphResolver>,
    pub tools: Arc<ToolRegistry>,
    pub tasks: Arc<TaskManager>,
    pub notifier: Arc<NotificationBus>,

    // ── Secondary ─────────────────────────────────────────────────────
    pub copilot: Arc<CopilotService>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token. `None` = dev mode.
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Resolve the LLM parameter bundle for a turn. Credential storage is
    /// external; the default bundle comes from config + environment.
    pub fn llm_params(&self) -> LlmParams {
        LlmParams {
            model: self.config.llm.model.clone(),
            api_key: std::env::var(&self.config.llm.api_key_env).ok(),
            base_url: self.config.llm.base_url.clone(),
            max_tokens: self.config.llm.max_tokens,
        }
    }
}
