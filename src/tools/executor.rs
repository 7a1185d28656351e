//! 工具执行器
//!
//! execute(name, input, ctx)：查找工具 -> 按 input schema 校验 -> 调用协作方；
//! 失败映射为 AgentError（UnknownTool / InvalidToolInput / ToolExecutionFailed），每次调用输出结构化审计日志（JSON）。
//! 不额外施加超时，由各协作方自身的超时约束。

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::core::AgentError;
use crate::memory::Profile;
use crate::tools::fallback::{resolve_unknown, UnknownResolution};
use crate::tools::schema::validate_input;
use crate::tools::{ToolContext, ToolRegistry};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行指定工具；缺省 input（null）按空对象处理
    pub async fn execute(
        &self,
        tool_name: &str,
        input: Value,
        ctx: &ToolContext,
    ) -> Result<Value, AgentError> {
        let start = Instant::now();
        let input_preview = input_preview(&input);
        let result = self.run(tool_name, input, ctx).await;

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(AgentError::UnknownTool(_)) => (false, "unknown_tool"),
            Err(AgentError::InvalidToolInput { .. }) => (false, "invalid_input"),
            Err(_) => (false, "error"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "user_id": ctx.user_id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "input_preview": input_preview,
        });
        tracing::info!(audit = %audit, "tool");
        result
    }

    async fn run(&self, tool_name: &str, input: Value, ctx: &ToolContext) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;
        let input = match input {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        validate_input(&tool.input_schema(), &input).map_err(|reason| AgentError::InvalidToolInput {
            tool: tool_name.to_string(),
            reason,
        })?;
        tool.execute(input, ctx)
            .await
            .map_err(|reason| AgentError::ToolExecutionFailed {
                tool: tool_name.to_string(),
                reason,
            })
    }

    /// UNKNOWN 动作的确定性回退：合成工具调用或返回澄清问题
    pub fn handle_unknown_action(&self, original_message: &str, profile: &Profile) -> UnknownResolution {
        match resolve_unknown(original_message, profile) {
            UnknownResolution::Tool(call) if !self.registry.contains(&call.name) => {
                tracing::debug!(tool = %call.name, "fallback tool not registered, asking instead");
                UnknownResolution::Clarify(
                    "Could you tell me a bit more about what you'd like me to do?".to_string(),
                )
            }
            resolution => resolution,
        }
    }
}

fn input_preview(input: &Value) -> String {
    let s = input.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
