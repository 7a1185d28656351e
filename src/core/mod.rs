//! 核心编排层：错误分类、任务调度、回合编排、后台任务、组装

pub mod background;
pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod task_scheduler;

pub use background::{BackgroundWorker, PostTurn};
pub use builder::{create_agent_builder, AgentBuilder};
pub use error::{AgentError, ErrorKind};
pub use orchestrator::{FrameSink, Orchestrator, TurnHandle, TurnOutcome, TurnRequest};
pub use task_scheduler::{TaskKind, TaskScheduler};
