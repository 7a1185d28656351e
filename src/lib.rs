//! JobPilot - Rust 求职对话智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时入口（供 HTTP/SSE 等调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、任务调度、回合编排、后台任务、组装
//! - **integrations**: 领域协作方接口与实现（HTTP / 进程内）
//! - **llm**: LLM 与嵌入客户端抽象及实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话日志、用户画像、摘要向量检索、画像抽取、SQLite 持久化
//! - **observability**: tracing 初始化
//! - **planning**: Plan / Action、流式帧协议、Planner
//! - **tools**: 工具注册表、schema 校验、执行器与领域工具

pub mod agent;
pub mod config;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod tools;

pub use crate::core::{AgentBuilder, Orchestrator, TurnHandle, TurnRequest};
pub use crate::planning::Frame;
