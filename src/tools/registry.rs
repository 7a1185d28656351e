//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / input_schema / execute），由 ToolRegistry 按名注册与查找。
//! Planner 通过 catalog() 枚举实时注册的工具生成提示词，新增工具无需改动 Planner。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// 工具调用上下文：当前用户与会话
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub user_id: String,
    pub conversation_id: String,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、输入 JSON Schema、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应计划动作中的 "name" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 输入 JSON Schema；执行前据此校验
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；input 已通过 schema 校验
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, String>;
}

/// 目录中的一项（name / inputSchema / description）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 工具注册表：按名称有序存储，目录顺序稳定
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 实时工具目录
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// 渲染为提示词段落：每个工具一段（名称、描述、输入 schema）
    pub fn to_prompt_section(&self) -> String {
        self.catalog()
            .iter()
            .map(|spec| {
                format!(
                    "- {}: {}\n  input schema: {}",
                    spec.name, spec.description, spec.input_schema
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(&'static str);

    #[async_trait]
    impl Tool for Dummy {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "dummy tool"
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, String> {
            Ok(input)
        }
    }

    #[test]
    fn test_catalog_reflects_registered_tools_in_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Dummy("zeta"));
        registry.register(Dummy("alpha"));
        let names: Vec<_> = registry.catalog().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        registry.register(Dummy("beta"));
        let section = registry.to_prompt_section();
        assert!(section.contains("- beta: dummy tool"));
        assert_eq!(registry.len(), 3);
    }
}
