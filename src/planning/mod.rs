//! 规划层：Plan / Action 数据模型、流式帧协议、Planner

pub mod events;
pub mod plan;
pub mod planner;

pub use events::{word_chunks, Frame};
pub use plan::{
    extract_json, group_actions, parse_plan_payload, plan_response_schema, Action, ActionGroup, Plan,
    ToolCall, FALLBACK_MESSAGE,
};
pub use planner::{is_trivial_message, PlanRequest, Planner, PlannerConfig};
