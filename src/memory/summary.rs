//! 记忆子系统：对话摘要 -> 嵌入 -> 向量存储，以及检索时的距离过滤
//!
//! 摘要是确定性的（不调用模型）：取最近 10 条 user/assistant 消息，按角色加前缀后硬截断。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::core::AgentError;
use crate::llm::EmbeddingProvider;
use crate::memory::{Conversation, MemorySummary, Role, VectorStore};

/// 摘要覆盖的最近消息条数
pub const SUMMARY_WINDOW: usize = 10;

/// 记忆子系统参数
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// 嵌入向量固定维度
    pub dimension: usize,
    /// 送去嵌入前的最大字符数
    pub max_input_chars: usize,
    /// 距离 >= 此值的结果一律丢弃
    pub max_distance: f32,
    /// 检索条数
    pub search_limit: usize,
    /// 摘要最大字符数
    pub summary_max_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            max_input_chars: 8000,
            max_distance: 0.5,
            search_limit: 3,
            summary_max_chars: 1000,
        }
    }
}

/// 保证同一进程内生成的摘要时间戳严格递增
static LAST_SUMMARY_MILLIS: AtomicI64 = AtomicI64::new(0);

fn next_summary_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_SUMMARY_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_SUMMARY_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// 确定性摘要：最近 SUMMARY_WINDOW 条 user/assistant 消息，"User: ..." / "Assistant: ..."，整体截断到 max_length 字符
pub fn create_conversation_summary(conversation: &Conversation, max_length: usize) -> String {
    let relevant: Vec<_> = conversation
        .messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .collect();
    let start = relevant.len().saturating_sub(SUMMARY_WINDOW);
    let text = relevant[start..]
        .iter()
        .map(|m| {
            let prefix = match m.role {
                Role::User => "User",
                _ => "Assistant",
            };
            format!("{prefix}: {}", m.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n");
    text.chars().take(max_length).collect()
}

/// 丢弃 distance >= max_distance（或缺失 distance）的检索结果
pub fn filter_by_distance(results: Vec<MemorySummary>, max_distance: f32) -> Vec<MemorySummary> {
    results
        .into_iter()
        .filter(|s| s.distance.is_some_and(|d| d < max_distance))
        .collect()
}

/// 记忆服务
pub struct MemoryService {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: MemoryConfig,
}

impl MemoryService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// 截断输入后嵌入，并校验维度
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let input: String = text.chars().take(self.config.max_input_chars).collect();
        let embedding = self
            .embedder
            .embed(&input)
            .await
            .map_err(AgentError::MemoryError)?;
        if embedding.len() != self.config.dimension {
            return Err(AgentError::EmbeddingDimension {
                expected: self.config.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    /// 最近邻检索，附带 distance；调用方负责阈值过滤
    pub async fn search_relevant_summaries(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemorySummary>, AgentError> {
        self.store.nearest(user_id, query_embedding, limit).await
    }

    /// 为 Planner 渲染记忆上下文；无相关结果时返回 None
    pub async fn relevant_context(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<Option<String>, AgentError> {
        let embedding = self.generate_embedding(query).await?;
        let hits = self
            .search_relevant_summaries(user_id, &embedding, self.config.search_limit)
            .await?;
        let hits = filter_by_distance(hits, self.config.max_distance);
        if hits.is_empty() {
            return Ok(None);
        }
        let body = hits
            .iter()
            .map(|h| format!("- {}", h.summary.replace('\n', " | ")))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(format!("Relevant past conversations:\n{body}")))
    }

    /// 摘要 -> 嵌入 -> 写入向量存储
    pub async fn persist_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<MemorySummary, AgentError> {
        let summary = create_conversation_summary(conversation, self.config.summary_max_chars);
        if summary.trim().is_empty() {
            return Err(AgentError::MemoryError("nothing to summarize".to_string()));
        }
        let embedding = self.generate_embedding(&summary).await?;
        let user_turns = conversation
            .messages
            .iter()
            .rev()
            .take(SUMMARY_WINDOW)
            .filter(|m| m.role == Role::User)
            .count();
        let record = MemorySummary {
            id: format!("{}_{}", conversation.id, next_summary_millis()),
            conversation_id: conversation.id.clone(),
            user_id: conversation.user_id.clone(),
            summary,
            embedding,
            importance: (user_turns as f32 / 5.0).min(1.0),
            created_at: Utc::now(),
            distance: None,
        };
        self.store.upsert(record.clone()).await?;
        tracing::debug!(
            conversation_id = %record.conversation_id,
            summary_id = %record.id,
            "conversation summary stored"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryVectorStore, Message};
    use async_trait::async_trait;

    /// 以关键词决定方向的二维嵌入
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
            if text.to_lowercase().contains("austin") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    struct WrongDimension;

    #[async_trait]
    impl EmbeddingProvider for WrongDimension {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    fn config() -> MemoryConfig {
        MemoryConfig {
            dimension: 2,
            ..MemoryConfig::default()
        }
    }

    fn conversation(id: &str, texts: &[&str]) -> Conversation {
        Conversation {
            id: id.to_string(),
            user_id: "u1".to_string(),
            messages: texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    if i % 2 == 0 {
                        Message::user(*t)
                    } else {
                        Message::assistant(*t)
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn test_summary_uses_last_ten_and_truncates() {
        let texts: Vec<String> = (0..14).map(|i| format!("m{i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let mut conv = conversation("c1", &refs);
        conv.messages.push(Message::system("ignored"));

        let summary = create_conversation_summary(&conv, 10_000);
        assert!(!summary.contains(": m3\n"));
        assert!(summary.starts_with("User: m4"));
        assert!(summary.ends_with("Assistant: m13"));
        assert!(!summary.contains("ignored"));

        let short = create_conversation_summary(&conv, 12);
        assert_eq!(short.chars().count(), 12);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let service = MemoryService::new(
            Arc::new(WrongDimension),
            Arc::new(InMemoryVectorStore::new()),
            config(),
        );
        let err = service.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::EmbeddingDimension {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_relevant_context_filters_distant_summaries() {
        let store = Arc::new(InMemoryVectorStore::new());
        let service = MemoryService::new(Arc::new(KeywordEmbedder), store.clone(), config());

        service
            .persist_conversation(&conversation("c1", &["jobs in Austin please", "Found 3"]))
            .await
            .unwrap();
        service
            .persist_conversation(&conversation("c2", &["write my resume", "Done"]))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        let ctx = service
            .relevant_context("u1", "anything new in Austin?")
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.contains("Austin"));
        assert!(!ctx.contains("resume"), "orthogonal summary must be filtered");

        let none = service.relevant_context("u2", "Austin").await.unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_filter_by_distance_boundary() {
        let make = |d: f32| MemorySummary {
            id: format!("{d}"),
            conversation_id: "c".into(),
            user_id: "u".into(),
            summary: "s".into(),
            embedding: vec![],
            importance: 0.0,
            created_at: Utc::now(),
            distance: Some(d),
        };
        let kept = filter_by_distance(vec![make(0.49), make(0.5), make(0.9)], 0.5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].distance, Some(0.49));
    }

    #[tokio::test]
    async fn test_repeated_persistence_produces_unique_ids() {
        let store = Arc::new(InMemoryVectorStore::new());
        let service = MemoryService::new(Arc::new(KeywordEmbedder), store.clone(), config());
        let conv = conversation("c1", &["Austin", "ok"]);
        let a = service.persist_conversation(&conv).await.unwrap();
        let b = service.persist_conversation(&conv).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("c1_"));
        assert_eq!(store.len().await, 2);
    }
}
