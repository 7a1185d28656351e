//! generate_resume：按目标职位或具体职位生成定制简历

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::integrations::{ResumeBuilder, ResumeRequest};
use crate::tools::schema::input_schema_for;
use crate::tools::{Tool, ToolContext};

pub const GENERATE_RESUME: &str = "generate_resume";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResumeInput {
    /// Tailor the resume to this listing
    pub job_id: Option<String>,
    /// Tailor the resume to a role when no listing is given
    pub target_role: Option<String>,
}

pub struct GenerateResumeTool {
    builder: Arc<dyn ResumeBuilder>,
}

impl GenerateResumeTool {
    pub fn new(builder: Arc<dyn ResumeBuilder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Tool for GenerateResumeTool {
    fn name(&self) -> &str {
        GENERATE_RESUME
    }

    fn description(&self) -> &str {
        "Generate a resume tailored to a job listing or a target role. Returns the resume document \
         including its resumeId."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<GenerateResumeInput>()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, String> {
        let input: GenerateResumeInput = serde_json::from_value(input).map_err(|e| e.to_string())?;
        self.builder
            .generate(&ResumeRequest {
                user_id: ctx.user_id.clone(),
                job_id: input.job_id,
                target_role: input.target_role,
            })
            .await
    }
}
