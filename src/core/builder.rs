//! Agent 构建器：从 AppConfig 组装 Orchestrator
//!
//! 各协作方（LLM、嵌入、存储、领域后端）可单独替换，未替换的按配置创建：
//! 有 sqlite_path 用 SQLite，否则用内存存储；有 backend_url 用 HTTP 后端，否则用进程内示例后端；
//! 嵌入只在有 API Key（或显式注入）且 memory.enabled 时启用。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::background::BackgroundWorker;
use crate::core::orchestrator::Orchestrator;
use crate::core::{AgentError, TaskScheduler};
use crate::integrations::{HttpBackend, LocalBackend};
use crate::llm::{create_embedder_from_config, create_llm_from_config, EmbeddingProvider, LlmClient};
use crate::memory::{
    ConversationStore, InMemoryConversationStore, InMemoryProfileRepository, InMemoryVectorStore,
    MemoryService, ProfileExtractor, ProfileRepository, ProfileStore, SqliteStore, VectorStore,
};
use crate::planning::Planner;
use crate::tools::{register_domain_tools, Collaborators, ToolExecutor, ToolRegistry};

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vectors: Option<Arc<dyn VectorStore>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    profiles: Option<Arc<dyn ProfileRepository>>,
    collaborators: Option<Collaborators>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            embedder: None,
            vectors: None,
            conversations: None,
            profiles: None,
            collaborators: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_vector_store(mut self, vectors: Arc<dyn VectorStore>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    pub fn with_conversation_store(mut self, conversations: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(conversations);
        self
    }

    pub fn with_profile_repository(mut self, profiles: Arc<dyn ProfileRepository>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn build_collaborators(&self) -> Result<Collaborators, AgentError> {
        if let Some(collaborators) = &self.collaborators {
            return Ok(collaborators.clone());
        }
        match &self.config.tools.backend_url {
            Some(url) => {
                tracing::info!(backend = %url, "using HTTP collaborators");
                let backend = HttpBackend::new(url, self.config.tools.backend_timeout_secs)
                    .map_err(AgentError::ConfigError)?;
                Ok(Collaborators::from_backend(Arc::new(backend)))
            }
            None => {
                tracing::info!("no backend_url configured, using in-process sample backend");
                Ok(Collaborators::from_backend(Arc::new(LocalBackend::with_sample_listings())))
            }
        }
    }

    /// 构建工具注册表（所有接入方式共享同一套工具）
    pub fn build_tool_registry(&self) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        register_domain_tools(&mut registry, &self.build_collaborators()?);
        Ok(registry)
    }

    fn build_stores(&self) -> Result<(Arc<dyn ConversationStore>, Arc<dyn ProfileRepository>), AgentError> {
        let sqlite = match &self.config.storage.sqlite_path {
            Some(path) if self.conversations.is_none() || self.profiles.is_none() => {
                tracing::info!(path = %path.display(), "opening sqlite store");
                Some(SqliteStore::open(path)?)
            }
            _ => None,
        };
        let conversations: Arc<dyn ConversationStore> = match (self.conversations.clone(), &sqlite) {
            (Some(custom), _) => custom,
            (None, Some(store)) => Arc::new(store.clone()),
            (None, None) => Arc::new(InMemoryConversationStore::new()),
        };
        let profiles: Arc<dyn ProfileRepository> = match (self.profiles.clone(), &sqlite) {
            (Some(custom), _) => custom,
            (None, Some(store)) => Arc::new(store.clone()),
            (None, None) => Arc::new(InMemoryProfileRepository::default()),
        };
        Ok((conversations, profiles))
    }

    fn build_memory(&self) -> Option<Arc<MemoryService>> {
        if !self.config.memory.enabled {
            return None;
        }
        let embedder = self.embedder.clone().or_else(|| {
            create_embedder_from_config(
                self.config.llm.base_url.as_deref(),
                &self.config.memory.embedding_model,
                self.config.llm.api_key.as_deref(),
                self.config.memory.dimension,
            )
        })?;
        let vectors: Arc<dyn VectorStore> = match self.vectors.clone() {
            Some(custom) => custom,
            None => Arc::new(InMemoryVectorStore::new()),
        };
        Some(Arc::new(MemoryService::new(
            embedder,
            vectors,
            self.config.memory_config(),
        )))
    }

    pub fn build(self) -> Result<Arc<Orchestrator>, AgentError> {
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let registry = Arc::new(self.build_tool_registry()?);
        let (conversations, profile_repo) = self.build_stores()?;
        let profiles = Arc::new(ProfileStore::new(profile_repo));
        let memory = self.build_memory();
        let scheduler = Arc::new(TaskScheduler::new(self.config.tools.max_concurrent));

        let mut planner = Planner::new(llm.clone(), registry.clone(), self.config.planner_config());
        let mut background = BackgroundWorker::new(scheduler.clone(), conversations.clone(), profiles.clone())
            .with_extractor(Arc::new(ProfileExtractor::new(llm)));
        if let Some(memory) = memory {
            planner = planner.with_memory(memory.clone());
            background = background.with_memory(memory);
        } else {
            tracing::debug!("memory enrichment disabled");
        }

        tracing::info!(tools = ?registry.tool_names(), "agent ready");
        Ok(Arc::new(Orchestrator::new(
            Arc::new(planner),
            Arc::new(ToolExecutor::new(registry)),
            conversations,
            profiles,
            scheduler,
            background,
        )))
    }
}

/// 便捷函数：加载配置（失败时使用默认值）并创建 AgentBuilder
pub fn create_agent_builder(config_path: Option<PathBuf>) -> AgentBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    AgentBuilder::new(config)
}
