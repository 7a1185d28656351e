//! 对话日志：按会话追加、只读查询
//!
//! 消息顺序有意义，只追加不重写；ConversationStore 为协作方接口，InMemoryConversationStore 为进程内实现。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::AgentError;

/// 消息角色（与 LLM API 一致；System 只出现在发给模型的提示中）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::System,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// 一段会话：用于摘要与画像抽取
#[derive(Clone, Debug)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub messages: Vec<Message>,
}

/// 对话存储接口
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 追加一条消息，返回追加后该会话的消息总数
    async fn append(&self, conversation_id: &str, message: Message) -> Result<usize, AgentError>;

    /// 读取会话消息（按时间顺序）；limit 为 Some(n) 时只返回最近 n 条
    async fn messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, AgentError>;

    /// 用户显式清空会话
    async fn clear(&self, conversation_id: &str) -> Result<(), AgentError>;
}

/// 进程内对话存储
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 取切片末尾至多 n 条
pub(crate) fn tail(messages: &[Message], limit: Option<usize>) -> Vec<Message> {
    match limit {
        Some(n) if messages.len() > n => messages[messages.len() - n..].to_vec(),
        _ => messages.to_vec(),
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, conversation_id: &str, message: Message) -> Result<usize, AgentError> {
        let mut conversations = self.conversations.write().await;
        let log = conversations.entry(conversation_id.to_string()).or_default();
        log.push(message);
        Ok(log.len())
    }

    async fn messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, AgentError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .map(|log| tail(log, limit))
            .unwrap_or_default())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), AgentError> {
        self.conversations.write().await.remove(conversation_id);
        Ok(())
    }
}
