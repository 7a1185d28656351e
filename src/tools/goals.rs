//! 目标与例程工具：set_goal、list_goals、create_routine

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::integrations::GoalStore;
use crate::tools::schema::input_schema_for;
use crate::tools::{Tool, ToolContext};

pub const SET_GOAL: &str = "set_goal";
pub const LIST_GOALS: &str = "list_goals";
pub const CREATE_ROUTINE: &str = "create_routine";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetGoalInput {
    pub title: String,
    /// ISO date, e.g. 2026-12-31
    pub target_date: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListGoalsInput {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    fn as_str(self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateRoutineInput {
    pub title: String,
    pub cadence: Cadence,
}

pub struct SetGoalTool {
    store: Arc<dyn GoalStore>,
}

impl SetGoalTool {
    pub fn new(store: Arc<dyn GoalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetGoalTool {
    fn name(&self) -> &str {
        SET_GOAL
    }

    fn description(&self) -> &str {
        "Record a job-search goal for the user, optionally with a target date."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<SetGoalInput>()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, String> {
        let input: SetGoalInput = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let goal = self
            .store
            .create_goal(&ctx.user_id, &input.title, input.target_date.as_deref())
            .await?;
        serde_json::to_value(goal).map_err(|e| e.to_string())
    }
}

pub struct ListGoalsTool {
    store: Arc<dyn GoalStore>,
}

impl ListGoalsTool {
    pub fn new(store: Arc<dyn GoalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListGoalsTool {
    fn name(&self) -> &str {
        LIST_GOALS
    }

    fn description(&self) -> &str {
        "List the user's current job-search goals."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<ListGoalsInput>()
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<Value, String> {
        let goals = self.store.list_goals(&ctx.user_id).await?;
        Ok(json!({ "count": goals.len(), "goals": goals }))
    }
}

pub struct CreateRoutineTool {
    store: Arc<dyn GoalStore>,
}

impl CreateRoutineTool {
    pub fn new(store: Arc<dyn GoalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateRoutineTool {
    fn name(&self) -> &str {
        CREATE_ROUTINE
    }

    fn description(&self) -> &str {
        "Create a recurring job-search routine (daily, weekly or monthly), e.g. \"apply to 5 jobs\"."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<CreateRoutineInput>()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, String> {
        let input: CreateRoutineInput = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let routine = self
            .store
            .create_routine(&ctx.user_id, &input.title, input.cadence.as_str())
            .await?;
        serde_json::to_value(routine).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::LocalBackend;
    use crate::tools::schema::validate_input;

    #[tokio::test]
    async fn test_goals_are_scoped_to_user() {
        let backend = Arc::new(LocalBackend::default());
        let set = SetGoalTool::new(backend.clone());
        let list = ListGoalsTool::new(backend);

        set.execute(json!({"title": "Land a PM role"}), &ToolContext::new("u1", "c1"))
            .await
            .unwrap();
        let mine = list.execute(json!({}), &ToolContext::new("u1", "c1")).await.unwrap();
        let theirs = list.execute(json!({}), &ToolContext::new("u2", "c2")).await.unwrap();
        assert_eq!(mine["count"], 1);
        assert_eq!(mine["goals"][0]["title"], "Land a PM role");
        assert_eq!(theirs["count"], 0);
    }

    #[test]
    fn test_routine_cadence_is_constrained() {
        let schema = CreateRoutineTool::new(Arc::new(LocalBackend::default())).input_schema();
        assert!(validate_input(&schema, &json!({"title": "apply", "cadence": "weekly"})).is_ok());
        assert!(validate_input(&schema, &json!({"title": "apply", "cadence": "hourly"})).is_err());
    }
}
