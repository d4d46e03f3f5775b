//! Process-wide server state: one instance of everything the command handlers and
//! connection loop share, built once at startup (§6 "Environment & configuration").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use runtime::approval::ApprovalGate;
use runtime::execution::{ShellExecutionRegistry, ToolExecutionManager};
use runtime::hitl::HitlCoordinator;
use runtime::llm::provider::{AnthropicClient, GoogleClient, OpenAiClient};
use runtime::llm::{LlmClient, LlmQueue};
use runtime::orchestrator::Orchestrator;
use runtime::queue::{MessageDispatcher, QueueManager};
use runtime::skills::SkillRegistry;
use runtime::tools::{register_builtin_tools, ToolRegistry};
use runtime::{Storage, WorldRegistry};

pub struct ServerState {
    pub storage: Arc<dyn Storage>,
    pub world_registry: Arc<WorldRegistry>,
    pub queue_manager: Arc<QueueManager>,
    pub subscriptions: Arc<runtime::subscription::SubscriptionManager>,
    pub dispatcher: Arc<dyn MessageDispatcher>,
    pub shell_executions: Arc<ShellExecutionRegistry>,
}

/// Everything needed to build one [`ServerState`]: provider credentials, storage
/// location, workspace path, and project-scoped skill roots.
pub struct ServerConfig {
    pub storage_path: PathBuf,
    pub workspace_path: Option<PathBuf>,
    pub skill_roots: Vec<PathBuf>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl ServerConfig {
    /// Reads provider keys and paths from the process environment (§6), via the
    /// `config` crate's env var accessors.
    pub fn from_env() -> Self {
        ServerConfig {
            storage_path: config::storage_location().join("agent-world.sqlite3"),
            workspace_path: Some(config::workspace_path()),
            skill_roots: Vec::new(),
            openai_api_key: config::provider_api_key(config::ProviderKind::OpenAi),
            anthropic_api_key: config::provider_api_key(config::ProviderKind::Anthropic),
            google_api_key: config::provider_api_key(config::ProviderKind::Google),
        }
    }
}

impl ServerState {
    pub async fn build(cfg: ServerConfig) -> Result<Arc<Self>, runtime::WorldError> {
        if let Some(parent) = cfg.storage_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| runtime::WorldError::Persistence(e.to_string()))?;
        }
        let storage: Arc<dyn Storage> = Arc::new(storage::SqliteStorage::open(&cfg.storage_path)?);
        let world_registry = Arc::new(WorldRegistry::new());
        let llm_queue = Arc::new(LlmQueue::new());

        let mut clients: HashMap<String, Arc<dyn LlmClient>> = HashMap::new();
        if let Some(key) = cfg.openai_api_key {
            clients.insert("openai".to_string(), Arc::new(OpenAiClient::new(key)));
        }
        if let Some(key) = cfg.anthropic_api_key {
            clients.insert("anthropic".to_string(), Arc::new(AnthropicClient::new(key)));
        }
        if let Some(key) = cfg.google_api_key {
            clients.insert("google".to_string(), Arc::new(GoogleClient::new(key)));
        }

        let approval = Arc::new(ApprovalGate::new());
        let shell_executions = Arc::new(ShellExecutionRegistry::new());
        let skills = Arc::new(SkillRegistry::new(cfg.skill_roots));
        skills.sync().await;
        let hitl = Arc::new(HitlCoordinator::new());

        let mut registry = ToolRegistry::new();
        register_builtin_tools(
            &mut registry,
            shell_executions.clone(),
            cfg.workspace_path,
            skills.clone(),
            storage.clone(),
            hitl.clone(),
        );
        let tools = Arc::new(registry);

        let execution = Arc::new(ToolExecutionManager::new(tools.clone(), approval.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            storage.clone(),
            world_registry.clone(),
            llm_queue,
            clients,
            tools,
            execution,
            approval,
            hitl,
        ));
        let dispatcher: Arc<dyn MessageDispatcher> = orchestrator;

        let subscriptions = Arc::new(runtime::subscription::SubscriptionManager::new(world_registry.clone(), storage.clone()));

        Ok(Arc::new(ServerState {
            storage,
            world_registry,
            queue_manager: Arc::new(QueueManager::new()),
            subscriptions,
            dispatcher,
            shell_executions,
        }))
    }
}
