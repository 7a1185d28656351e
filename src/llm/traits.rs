//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! 可选 ResponseSchema 描述结构化输出契约（一个 JSON 文档）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use serde_json::Value;

use crate::memory::Message;

/// 流式完成返回的 Token 流
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;

/// 结构化输出契约：名称 + JSON Schema
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；format 为 Some 时要求模型只输出符合 schema 的 JSON
    async fn complete(
        &self,
        messages: &[Message],
        format: Option<&ResponseSchema>,
    ) -> Result<String, String>;

    /// 流式完成，返回 Token 流；默认实现把 complete 的结果作为单个 Token
    async fn complete_stream(
        &self,
        messages: &[Message],
        format: Option<&ResponseSchema>,
    ) -> Result<TokenStream, String> {
        let content = self.complete(messages, format).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
