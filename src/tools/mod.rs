pub mod executor;
pub mod fallback;
pub mod goals;
pub mod jobs;
pub mod registry;
pub mod resume;
pub mod schema;

use std::sync::Arc;

use crate::integrations::{ApplicationSubmitter, GoalStore, JobBoard, ResumeBuilder};

pub use executor::ToolExecutor;
pub use fallback::{resolve_unknown, UnknownResolution};
pub use goals::{CreateRoutineTool, ListGoalsTool, SetGoalTool};
pub use jobs::{is_empty_search_result, ApplyToJobTool, SearchJobsTool, APPLY_TO_JOB, SEARCH_JOBS};
pub use registry::{Tool, ToolContext, ToolRegistry, ToolSpec};
pub use resume::GenerateResumeTool;
pub use schema::{input_schema_for, validate_input};

/// 协作方集合，用于注册完整的领域工具目录
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobBoard>,
    pub resumes: Arc<dyn ResumeBuilder>,
    pub applications: Arc<dyn ApplicationSubmitter>,
    pub goals: Arc<dyn GoalStore>,
}

impl Collaborators {
    /// 同一个后端同时实现四个协作方接口时使用
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: JobBoard + ResumeBuilder + ApplicationSubmitter + GoalStore + 'static,
    {
        Self {
            jobs: backend.clone(),
            resumes: backend.clone(),
            applications: backend.clone(),
            goals: backend,
        }
    }
}

/// 注册全部领域工具
pub fn register_domain_tools(registry: &mut ToolRegistry, collaborators: &Collaborators) {
    registry.register(SearchJobsTool::new(collaborators.jobs.clone()));
    registry.register(ApplyToJobTool::new(collaborators.applications.clone()));
    registry.register(GenerateResumeTool::new(collaborators.resumes.clone()));
    registry.register(SetGoalTool::new(collaborators.goals.clone()));
    registry.register(ListGoalsTool::new(collaborators.goals.clone()));
    registry.register(CreateRoutineTool::new(collaborators.goals.clone()));
}
