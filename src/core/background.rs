//! 回合后的即发即弃任务
//!
//! done 帧之后派发，互不依赖、各自容错：
//! - 助手回复落库（回复为空则跳过），随后分别派发摘要持久化与全量画像抽取（会话第 3、6、9… 条消息）
//! - 模式抽取（每轮）
//! 任何失败只在任务边界记录，不回传给调用方。

use std::sync::Arc;

use crate::core::{AgentError, TaskScheduler};
use crate::memory::{
    extract_quick_facts, should_run_full_extraction, Conversation, ConversationStore, MemoryService,
    Message, ProfileExtractor, ProfileStore, SUMMARY_WINDOW,
};

/// 全量抽取读取的最近消息数
const EXTRACTION_HISTORY: usize = 10;

/// 一轮结束后需要处理的数据
#[derive(Debug, Clone)]
pub struct PostTurn {
    pub user_id: String,
    pub conversation_id: String,
    pub user_message: String,
    /// 累计的助手文本；为空时不写入会话
    pub assistant_text: String,
    /// 用户消息追加后的会话消息数；追加失败时为 None
    pub message_count: Option<usize>,
}

#[derive(Clone)]
pub struct BackgroundWorker {
    scheduler: Arc<TaskScheduler>,
    conversations: Arc<dyn ConversationStore>,
    profiles: Arc<ProfileStore>,
    extractor: Option<Arc<ProfileExtractor>>,
    memory: Option<Arc<MemoryService>>,
}

impl BackgroundWorker {
    pub fn new(
        scheduler: Arc<TaskScheduler>,
        conversations: Arc<dyn ConversationStore>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        Self {
            scheduler,
            conversations,
            profiles,
            extractor: None,
            memory: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<ProfileExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_memory(mut self, memory: Arc<MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn dispatch(&self, job: PostTurn) {
        let job = Arc::new(job);

        if let Some(update) = extract_quick_facts(&job.user_message) {
            let profiles = self.profiles.clone();
            let user_id = job.user_id.clone();
            self.scheduler.spawn_background("quick_facts", async move {
                profiles.update_user_profile(&user_id, &update).await?;
                tracing::debug!(user_id = %user_id, "quick facts merged");
                Ok(())
            });
        }

        let worker = self.clone();
        self.scheduler.spawn_background("persist_turn", async move {
            // 回复是否落库都不影响后续任务
            let (assistant_count, persisted) = match worker.persist_assistant(&job).await {
                Ok(count) => (count, Ok(())),
                Err(e) => (None, Err(e)),
            };
            worker.spawn_transcript_tasks(job, assistant_count);
            persisted
        });
    }

    /// 追加助手回复，返回追加后的消息数；回复为空时不追加
    async fn persist_assistant(&self, job: &PostTurn) -> Result<Option<usize>, AgentError> {
        if job.assistant_text.trim().is_empty() {
            return Ok(None);
        }
        let count = self
            .conversations
            .append(&job.conversation_id, Message::assistant(job.assistant_text.clone()))
            .await?;
        Ok(Some(count))
    }

    /// 用户消息或助手回复任一次追加落在 3 的倍数上即触发全量抽取
    fn spawn_transcript_tasks(&self, job: Arc<PostTurn>, assistant_count: Option<usize>) {
        let run_extraction = job
            .message_count
            .into_iter()
            .chain(assistant_count)
            .any(should_run_full_extraction);
        if let (true, Some(extractor)) = (run_extraction, self.extractor.clone()) {
            let conversations = self.conversations.clone();
            let profiles = self.profiles.clone();
            let job = job.clone();
            self.scheduler.spawn_background("full_extraction", async move {
                let history = conversations
                    .messages(&job.conversation_id, Some(EXTRACTION_HISTORY))
                    .await?;
                if let Some(update) = extractor.extract(&history).await? {
                    profiles.update_user_profile(&job.user_id, &update).await?;
                    tracing::debug!(user_id = %job.user_id, "profile re-extracted");
                }
                Ok(())
            });
        }

        if let Some(memory) = self.memory.clone() {
            let conversations = self.conversations.clone();
            self.scheduler.spawn_background("conversation_summary", async move {
                let messages = conversations
                    .messages(&job.conversation_id, Some(SUMMARY_WINDOW))
                    .await?;
                let conversation = Conversation {
                    id: job.conversation_id.clone(),
                    user_id: job.user_id.clone(),
                    messages,
                };
                memory.persist_conversation(&conversation).await?;
                Ok(())
            });
        }
    }
}
