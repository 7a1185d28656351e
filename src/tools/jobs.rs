//! 职位工具：search_jobs（只读检索）与 apply_to_job（唯一有副作用的投递）
//!
//! search_jobs 的输出带 items / count 字段，编排器据此判断是否触发反馈重规划。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::integrations::{ApplicationSubmitter, JobBoard, JobQuery};
use crate::tools::schema::input_schema_for;
use crate::tools::{Tool, ToolContext};

pub const SEARCH_JOBS: &str = "search_jobs";
pub const APPLY_TO_JOB: &str = "apply_to_job";

/// search_jobs 结果为空（items 为空数组或 count 为 0）
pub fn is_empty_search_result(result: &Value) -> bool {
    let no_items = result
        .get("items")
        .and_then(Value::as_array)
        .map_or(false, Vec::is_empty);
    let zero_count = result.get("count").and_then(Value::as_u64) == Some(0);
    no_items || zero_count
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchJobsInput {
    /// Job title to search for, e.g. "Product Manager"
    pub role: String,
    /// City or region, e.g. "Austin, TX"
    pub location: Option<String>,
    pub remote: Option<bool>,
    /// Minimum annual salary in USD
    pub salary_min: Option<u64>,
    pub limit: Option<u32>,
}

pub struct SearchJobsTool {
    board: Arc<dyn JobBoard>,
}

impl SearchJobsTool {
    pub fn new(board: Arc<dyn JobBoard>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for SearchJobsTool {
    fn name(&self) -> &str {
        SEARCH_JOBS
    }

    fn description(&self) -> &str {
        "Search open job listings by role, with optional location, remote flag and salary floor. \
         Returns {items, count, query}."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<SearchJobsInput>()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value, String> {
        let input: SearchJobsInput = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let query = JobQuery {
            role: input.role,
            location: input.location,
            remote: input.remote,
            salary_min: input.salary_min,
            limit: input.limit,
        };
        let items = self.board.search(&query).await?;
        Ok(json!({
            "count": items.len(),
            "items": items,
            "query": query,
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyToJobInput {
    /// Id of a listing returned by search_jobs
    pub job_id: String,
    /// Resume produced by generate_resume, if any
    pub resume_id: Option<String>,
}

pub struct ApplyToJobTool {
    submitter: Arc<dyn ApplicationSubmitter>,
}

impl ApplyToJobTool {
    pub fn new(submitter: Arc<dyn ApplicationSubmitter>) -> Self {
        Self { submitter }
    }
}

#[async_trait]
impl Tool for ApplyToJobTool {
    fn name(&self) -> &str {
        APPLY_TO_JOB
    }

    fn description(&self) -> &str {
        "Submit an application for a job listing on behalf of the user. Repeating the call for \
         the same job returns the original receipt."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<ApplyToJobInput>()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, String> {
        let input: ApplyToJobInput = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let receipt = self
            .submitter
            .submit(&ctx.user_id, &input.job_id, input.resume_id.as_deref())
            .await?;
        serde_json::to_value(receipt).map_err(|e| e.to_string())
    }
}
