//! Plan 与 Action：规划器输出的结构化计划
//!
//! Action 为封闭的标签联合 {Message, Tool, Unknown}，由编排器穷尽处理。
//! group_actions 把连续的 Tool 动作合并为一个并行组，其余动作各自成为同步单元组。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ResponseSchema;

/// 规划失败时的安全回复
pub const FALLBACK_MESSAGE: &str = "I can help you search for jobs, tailor your resume, apply to \
positions, or track your goals. What would you like to do?";

/// 一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "message")]
    Message { content: String },
    #[serde(rename = "tool")]
    Tool(ToolCall),
    #[serde(rename = "UNKNOWN")]
    Unknown {
        #[serde(rename = "originalMessage")]
        original_message: String,
    },
}

impl Action {
    pub fn message(content: impl Into<String>) -> Self {
        Action::Message {
            content: content.into(),
        }
    }

    pub fn tool(name: impl Into<String>, input: Value) -> Self {
        Action::Tool(ToolCall::new(name, input))
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Action::Tool(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Action::Unknown { .. })
    }
}

/// 规划结果：推理说明 + 有序动作（至少一个；含 Unknown 时只有它）
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub reasoning: String,
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn fallback() -> Self {
        Self {
            reasoning: "fallback".to_string(),
            actions: vec![Action::message(FALLBACK_MESSAGE)],
        }
    }

    /// 强制不变量：空计划 -> 回退消息；出现 Unknown -> 只保留第一个 Unknown
    pub fn normalize(self) -> Self {
        if self.actions.is_empty() {
            return Self {
                reasoning: self.reasoning,
                ..Self::fallback()
            };
        }
        if let Some(unknown) = self.actions.iter().find(|a| a.is_unknown()).cloned() {
            return Self {
                reasoning: self.reasoning,
                actions: vec![unknown],
            };
        }
        self
    }
}

/// 执行分组
#[derive(Debug, Clone, PartialEq)]
pub enum ActionGroup {
    /// 同步单元：Message 或 Unknown，单独执行
    Single(Action),
    /// 连续 Tool 的最大段，组内并发
    Tools(Vec<ToolCall>),
}

/// 分组：[message, tool, tool, message, tool] -> [[message], [tool, tool], [message], [tool]]
pub fn group_actions(actions: Vec<Action>) -> Vec<ActionGroup> {
    let mut groups = Vec::new();
    let mut run: Vec<ToolCall> = Vec::new();
    for action in actions {
        match action {
            Action::Tool(call) => run.push(call),
            other => {
                if !run.is_empty() {
                    groups.push(ActionGroup::Tools(std::mem::take(&mut run)));
                }
                groups.push(ActionGroup::Single(other));
            }
        }
    }
    if !run.is_empty() {
        groups.push(ActionGroup::Tools(run));
    }
    groups
}

/// 模型输出的动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum ActionKind {
    #[serde(rename = "message")]
    Message,
    #[serde(rename = "tool")]
    Tool,
    #[serde(rename = "UNKNOWN", alias = "unknown")]
    Unknown,
}

/// 模型输出中的单个动作（字段按类型选填）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlanActionPayload {
    /// message | tool | UNKNOWN
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// type=message 时的回复文本
    #[serde(default)]
    pub content: Option<String>,
    /// type=tool 时的工具名
    #[serde(default)]
    pub name: Option<String>,
    /// type=tool 时的工具参数
    #[serde(default)]
    pub input: Option<Value>,
    /// type=UNKNOWN 时的原始用户消息
    #[serde(default, rename = "originalMessage")]
    pub original_message: Option<String>,
}

/// 结构化输出契约：{plan, actions}
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PlanPayload {
    /// 简短的推理说明
    pub plan: String,
    /// 有序动作列表
    pub actions: Vec<PlanActionPayload>,
}

/// 供 LlmClient 使用的输出 schema
pub fn plan_response_schema() -> ResponseSchema {
    let schema = schema_for!(PlanPayload);
    let value = serde_json::to_value(&schema).unwrap_or(Value::Null);
    ResponseSchema::new("agent_plan", value)
}

impl TryFrom<PlanActionPayload> for Action {
    type Error = AgentError;

    fn try_from(raw: PlanActionPayload) -> Result<Self, Self::Error> {
        match raw.kind {
            ActionKind::Message => raw
                .content
                .filter(|c| !c.trim().is_empty())
                .map(|content| Action::Message { content })
                .ok_or_else(|| AgentError::MalformedPlan("message action without content".into())),
            ActionKind::Tool => {
                let name = raw
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| AgentError::MalformedPlan("tool action without name".into()))?;
                let input = match raw.input {
                    Some(Value::Null) | None => Value::Object(Default::default()),
                    Some(v) => v,
                };
                Ok(Action::tool(name, input))
            }
            ActionKind::Unknown => Ok(Action::Unknown {
                original_message: raw.original_message.or(raw.content).unwrap_or_default(),
            }),
        }
    }
}

/// 从模型输出中提取 JSON（```json ... ``` 或第一个 { 到最后一个 }）
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析完整的结构化输出为规范化的 Plan；不完整或非法 JSON 返回 MalformedPlan
pub fn parse_plan_payload(output: &str) -> Result<Plan, AgentError> {
    let json = extract_json(output)
        .ok_or_else(|| AgentError::MalformedPlan(format!("no JSON object in: {output}")))?;
    let payload: PlanPayload = serde_json::from_str(json)
        .map_err(|e| AgentError::MalformedPlan(format!("{e}: {json}")))?;
    let actions = payload
        .actions
        .into_iter()
        .map(Action::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Plan {
        reasoning: payload.plan,
        actions,
    }
    .normalize())
}
