//! Planner：把 {消息, 最近历史, 画像上下文, 记忆上下文} 转为结构化 Plan
//!
//! 系统提示词由注册表的实时工具目录生成。模型调用要求固定的结构化输出契约，
//! Token 流只用于活性遥测，完整输出结束后一次性解析。
//! 记忆检索与计时器竞速，超时视为无上下文；模型超时或输出非法时回退为单条安全消息。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::{LlmClient, ResponseSchema};
use crate::memory::{conversation::tail, MemoryService, Message, Role};
use crate::planning::plan::{parse_plan_payload, plan_response_schema, Plan, ToolCall};
use crate::tools::ToolRegistry;

/// 每隔多少个 Token 输出一次 trace
const TOKEN_TRACE_INTERVAL: usize = 50;

const TRIVIAL_MESSAGES: &[&str] = &[
    "hi", "hello", "hey", "hiya", "yo", "sup", "good morning", "good afternoon", "good evening",
    "thanks", "thank you", "thx", "ty", "ok", "okay", "k", "cool", "great", "nice", "bye",
    "goodbye", "yes", "no", "sure",
];

/// 寒暄类输入：跳过记忆检索并强制 fastMode
pub fn is_trivial_message(message: &str) -> bool {
    let normalized = message
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();
    normalized.is_empty() || TRIVIAL_MESSAGES.contains(&normalized.as_str())
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// 模型调用硬上限
    pub timeout: Duration,
    /// 记忆检索竞速时长
    pub memory_timeout: Duration,
    /// 送入模型的最近历史条数
    pub history_window: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            memory_timeout: Duration::from_millis(1500),
            history_window: 20,
        }
    }
}

/// 一次规划请求
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub user_id: &'a str,
    pub message: &'a str,
    /// 不含本条消息的历史
    pub history: &'a [Message],
    pub profile_context: &'a str,
    pub fast_mode: bool,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    memory: Option<Arc<MemoryService>>,
    schema: ResponseSchema,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, config: PlannerConfig) -> Self {
        Self {
            llm,
            registry,
            memory: None,
            schema: plan_response_schema(),
            config,
        }
    }

    pub fn with_memory(mut self, memory: Arc<MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 生成计划；任何失败都回退为安全消息，不向调用方报错
    pub async fn plan(&self, req: PlanRequest<'_>) -> Plan {
        let fast = req.fast_mode || is_trivial_message(req.message);
        let memory_context = if fast {
            None
        } else {
            self.memory_context(req.user_id, req.message).await
        };
        let system = self.system_prompt(req.profile_context, memory_context.as_deref());
        let messages = self.build_messages(system, req.history, req.message);

        match self.request_plan(&messages).await {
            Ok(plan) => {
                tracing::debug!(
                    user_id = %req.user_id,
                    actions = plan.actions.len(),
                    reasoning = %plan.reasoning,
                    "plan ready"
                );
                plan
            }
            Err(e) => {
                tracing::warn!(user_id = %req.user_id, error = %e, "planning failed, using fallback");
                Plan::fallback()
            }
        }
    }

    /// 检索结果为空后的一次性重规划：合成提示描述空结果与原参数，以 fastMode 规划
    pub async fn replan_after_empty_result(&self, original: PlanRequest<'_>, call: &ToolCall) -> Plan {
        let prompt = format!(
            "The user asked: \"{}\". The {} call with input {} returned no results. \
             Suggest a broader or alternative search (for example a related title, a nearby \
             location or remote work) and explain briefly to the user.",
            original.message, call.name, call.input
        );
        self.plan(PlanRequest {
            message: &prompt,
            fast_mode: true,
            ..original
        })
        .await
    }

    /// 记忆检索与计时器竞速；超时、失败或无结果均返回 None
    async fn memory_context(&self, user_id: &str, query: &str) -> Option<String> {
        let memory = self.memory.as_ref()?;
        tokio::select! {
            result = memory.relevant_context(user_id, query) => match result {
                Ok(context) => context,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "memory lookup failed");
                    None
                }
            },
            _ = tokio::time::sleep(self.config.memory_timeout) => {
                tracing::debug!(user_id = %user_id, "memory lookup timed out");
                None
            }
        }
    }

    /// 系统提示词：角色说明 + 实时工具目录 + 画像 + 记忆
    pub fn system_prompt(&self, profile_context: &str, memory_context: Option<&str>) -> String {
        let mut prompt = String::from(
            "You are a job-search assistant. Turn the user's latest message into a plan.\n\
             Respond with JSON only: {\"plan\": string, \"actions\": Action[]}.\n\
             Each action is one of:\n\
             - {\"type\": \"message\", \"content\": text shown to the user}\n\
             - {\"type\": \"tool\", \"name\": tool name, \"input\": object matching the tool's input schema}\n\
             - {\"type\": \"UNKNOWN\", \"originalMessage\": the user's message} when the intent is unclear; it must be the only action.\n\
             Consecutive tool actions run in parallel, so only place independent calls next to each other.\n\n\
             Available tools:\n",
        );
        prompt.push_str(&self.registry.to_prompt_section());
        prompt.push_str("\n\nUser profile:\n");
        prompt.push_str(profile_context);
        if let Some(memory) = memory_context {
            prompt.push_str("\n\n");
            prompt.push_str(memory);
        }
        prompt
    }

    fn build_messages(&self, system: String, history: &[Message], message: &str) -> Vec<Message> {
        let mut messages = vec![Message::system(system)];
        messages.extend(
            tail(history, Some(self.config.history_window))
                .into_iter()
                .filter(|m| m.role != Role::System),
        );
        messages.push(Message::user(message));
        messages
    }

    async fn request_plan(&self, messages: &[Message]) -> Result<Plan, AgentError> {
        let output = timeout(self.config.timeout, self.collect_stream(messages))
            .await
            .map_err(|_| AgentError::PlannerTimeout(self.config.timeout.as_secs()))??;
        parse_plan_payload(&output)
    }

    /// 消费 Token 流拼出完整输出；Token 只用于活性遥测
    async fn collect_stream(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut stream = self
            .llm
            .complete_stream(messages, Some(&self.schema))
            .await
            .map_err(AgentError::LlmError)?;
        let mut output = String::new();
        let mut tokens = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(AgentError::LlmError)?;
            output.push_str(&chunk);
            tokens += 1;
            if tokens % TOKEN_TRACE_INTERVAL == 0 {
                tracing::trace!(tokens, "planner streaming");
            }
        }
        tracing::debug!(tokens, chars = output.len(), "planner stream complete");
        Ok(output)
    }
}
