//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JOBPILOT__*` 覆盖（双下划线表示嵌套，如 `JOBPILOT__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::memory::MemoryConfig;
use crate::planning::PlannerConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
    pub storage: StorageSection,
}

/// [app] 段：应用名、送入 Planner 的历史窗口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 每回合加载的最近消息条数
    pub history_window: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_window: 20,
        }
    }
}

/// [llm] 段：模型与端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读 OPENAI_API_KEY；都没有则使用 Mock
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// [planner] 段：规划硬超时与记忆检索竞速超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub timeout_secs: u64,
    pub memory_timeout_ms: u64,
    pub memory_limit: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            memory_timeout_ms: 1500,
            memory_limit: 3,
        }
    }
}

/// [memory] 段：嵌入模型与检索阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub enabled: bool,
    pub embedding_model: String,
    pub dimension: usize,
    pub max_input_chars: usize,
    pub max_distance: f32,
    pub summary_max_chars: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            max_input_chars: 8000,
            max_distance: 0.5,
            summary_max_chars: 1000,
        }
    }
}

/// [tools] 段：工具并发上限、协作方后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub max_concurrent: usize,
    /// HTTP 协作方根地址；未设置时使用进程内 LocalBackend
    pub backend_url: Option<String>,
    /// 协作方自身的请求超时（秒）
    pub backend_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            backend_url: None,
            backend_timeout_secs: 20,
        }
    }
}

/// [storage] 段：SQLite 路径；未设置时对话与画像保存在内存
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    pub sqlite_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            timeout: Duration::from_secs(self.planner.timeout_secs),
            memory_timeout: Duration::from_millis(self.planner.memory_timeout_ms),
            history_window: self.app.history_window,
        }
    }

    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            dimension: self.memory.dimension,
            max_input_chars: self.memory.max_input_chars,
            max_distance: self.memory.max_distance,
            search_limit: self.planner.memory_limit,
            summary_max_chars: self.memory.summary_max_chars,
        }
    }
}

/// 从 config 目录加载配置，环境变量 JOBPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 JOBPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JOBPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
