//! 任务调度：工具并发许可 + 后台任务
//!
//! 工具执行使用 Semaphore 限制进程级并发（单个工具或一整个并行组占一个许可）；后台任务（抽取、摘要、持久化）即发即弃，
//! 错误只在任务边界记录日志，主回合从不等待。TaskTracker 仅供测试与优雅退出时排空。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;

use crate::core::AgentError;

/// 任务类型
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TaskKind {
    /// 前台回合，按组串行
    Turn,
    /// 可并行，受限
    ToolExecution,
    /// 后台，不阻塞回合
    Background,
}

/// 任务调度器
pub struct TaskScheduler {
    /// 同时执行的工具单元上限（默认 16）
    tool_semaphore: Arc<Semaphore>,
    background: TaskTracker,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max_concurrent_tools.max(1))),
            background: TaskTracker::new(),
        }
    }

    /// 获取工具执行许可；信号量从不关闭，None 仅作为兜底（此时不限流）
    pub async fn acquire_tool(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.tool_semaphore).acquire_owned().await.ok()
    }

    /// 派发后台任务：不 join，失败只记日志
    pub fn spawn_background<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        self.background.spawn(async move {
            match fut.await {
                Ok(()) => tracing::debug!(task = name, kind = ?TaskKind::Background, "background task finished"),
                Err(e) => tracing::warn!(task = name, error = %e, "background task failed"),
            }
        });
    }

    /// 当前仍在运行的后台任务数
    pub fn background_len(&self) -> usize {
        self.background.len()
    }

    /// 等待所有已派发的后台任务结束（测试与退出时使用），之后可继续派发
    pub async fn drain(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(16)
    }
}
