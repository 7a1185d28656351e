//! Agent 错误类型与错误分类
//!
//! 对应五类失败：规划失败（回退消息）、工具失败（error 帧）、记忆失败（静默）、
//! 持久化失败（仅日志）、配置错误。未知意图不是错误，由 `Action::Unknown` 表达。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Planner timeout after {0}s")]
    PlannerTimeout(u64),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid input for tool {tool}: {reason}")]
    InvalidToolInput { tool: String, reason: String },

    #[error("Tool execution failed: {tool}: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("Memory error: {0}")]
    MemoryError(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 错误所属类别，决定实时路径上的降级方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 回退为单条安全消息
    Planning,
    /// 逐个动作恢复，以 error 帧推送
    ToolExecution,
    /// 完全吞掉，本轮无记忆上下文
    Memory,
    /// 记录日志，不对外暴露
    Persistence,
    Config,
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::PlannerTimeout(_)
            | AgentError::LlmError(_)
            | AgentError::MalformedPlan(_) => ErrorKind::Planning,
            AgentError::UnknownTool(_)
            | AgentError::InvalidToolInput { .. }
            | AgentError::ToolExecutionFailed { .. } => ErrorKind::ToolExecution,
            AgentError::MemoryError(_) | AgentError::EmbeddingDimension { .. } => ErrorKind::Memory,
            AgentError::PersistenceError(_) => ErrorKind::Persistence,
            AgentError::ConfigError(_) => ErrorKind::Config,
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::PersistenceError(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::PersistenceError(format!("serialization: {e}"))
    }
}
