//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序返回预置回复；队列为空时回显最后一条 User 消息为单条 message 动作的计划。
//! 记录每次调用收到的消息，便于断言 system prompt 内容与调用次数。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, ResponseSchema, TokenStream};
use crate::memory::{Message, Role};

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组成功回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for r in responses {
            client.push_response(Ok(r.into()));
        }
        client
    }

    /// 每次调用前等待（用于超时测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: Result<String, String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    /// 已发生的调用次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息列表
    pub fn recorded_prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn echo_plan(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        serde_json::json!({
            "plan": "mock echo",
            "actions": [{"type": "message", "content": format!("Echo from Mock: {last_user}")}]
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _format: Option<&ResponseSchema>,
    ) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match scripted {
            Some(response) => response,
            None => Ok(Self::echo_plan(messages)),
        }
    }

    /// 把回复按字符切成多个 Token，模拟增量输出
    async fn complete_stream(
        &self,
        messages: &[Message],
        format: Option<&ResponseSchema>,
    ) -> Result<TokenStream, String> {
        let content = self.complete(messages, format).await?;
        let chars: Vec<char> = content.chars().collect();
        let tokens: Vec<Result<String, String>> = chars
            .chunks(8)
            .map(|c| Ok(c.iter().collect::<String>()))
            .collect();
        Ok(Box::pin(stream::iter(tokens)))
    }
}
