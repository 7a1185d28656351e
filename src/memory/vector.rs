//! 向量存储：对话摘要的嵌入与最近邻检索
//!
//! distance = 1 - cosine_similarity，查询时计算；按用户隔离。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::AgentError;

/// 已嵌入的对话摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    /// conversation_id + 时间戳，重复持久化同一会话也不冲突
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    /// 仅在查询结果中有值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// 向量检索接口
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 写入摘要；同 id 覆盖
    async fn upsert(&self, summary: MemorySummary) -> Result<(), AgentError>;

    /// 返回该用户下最近的至多 limit 条摘要（distance 升序）
    async fn nearest(
        &self,
        user_id: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemorySummary>, AgentError>;
}

/// 余弦相似度；维度不一致或零向量返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 进程内向量存储：线性扫描
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<MemorySummary>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, summary: MemorySummary) -> Result<(), AgentError> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.id == summary.id) {
            Some(existing) => *existing = summary,
            None => entries.push(summary),
        }
        Ok(())
    }

    async fn nearest(
        &self,
        user_id: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemorySummary>, AgentError> {
        let entries = self.entries.read().await;
        let mut scored: Vec<MemorySummary> = entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| {
                let mut hit = e.clone();
                hit.distance = Some(1.0 - cosine_similarity(&e.embedding, embedding));
                hit
            })
            .collect();
        scored.sort_by(|a, b| {
            a.distance
                .unwrap_or(f32::MAX)
                .total_cmp(&b.distance.unwrap_or(f32::MAX))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}
