//! UNKNOWN 意图的确定性回退（不调用模型）
//!
//! 职位与地点优先从原始消息解析，其次取画像默认值。
//! 有投递意图但未开启 autoApply 时请求确认；有职位时合成 search_jobs；否则请求澄清。

use serde_json::{json, Map, Value};

use crate::memory::extraction::parse_job_query;
use crate::memory::Profile;
use crate::planning::ToolCall;
use crate::tools::jobs::SEARCH_JOBS;

const ASK_FOR_ROLE: &str = "I want to make sure I get this right. What kind of role are you \
looking for, and where would you like to work?";

#[derive(Debug, Clone, PartialEq)]
pub enum UnknownResolution {
    /// 合成的最佳猜测工具调用
    Tool(ToolCall),
    /// 需要向用户澄清的问题
    Clarify(String),
}

fn has_apply_intent(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["apply", "submit my application", "send my resume"]
        .iter()
        .any(|kw| lower.contains(kw))
}

pub fn resolve_unknown(original_message: &str, profile: &Profile) -> UnknownResolution {
    let (parsed_role, parsed_location) = parse_job_query(original_message);
    let role = parsed_role.or_else(|| profile.target_roles().into_iter().next());
    let location = parsed_location.or_else(|| profile.locations().into_iter().next());

    if has_apply_intent(original_message) && !profile.auto_apply() {
        let target = role
            .as_deref()
            .map(|r| format!(" for {r} roles"))
            .unwrap_or_default();
        return UnknownResolution::Clarify(format!(
            "Automatic applications are turned off. Should I find matching jobs{target} so you can \
             pick which ones to apply to?"
        ));
    }

    match role {
        Some(role) => {
            let mut input = Map::new();
            input.insert("role".into(), json!(role));
            if let Some(location) = location {
                input.insert("location".into(), json!(location));
            }
            if let Some(salary) = profile.salary_min() {
                input.insert("salaryMin".into(), json!(salary));
            }
            UnknownResolution::Tool(ToolCall::new(SEARCH_JOBS, Value::Object(input)))
        }
        None => UnknownResolution::Clarify(ASK_FOR_ROLE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(prefs: Value) -> Profile {
        let mut value = Profile::default().into_value();
        crate::memory::deep_merge(&mut value, &json!({ "preferences": prefs }));
        Profile::from_value(value)
    }

    #[test]
    fn test_profile_defaults_drive_search() {
        let profile = profile_with(json!({"targetRoles": ["Data Analyst"], "locations": ["Denver"]}));
        let resolved = resolve_unknown("do the thing", &profile);
        assert_eq!(
            resolved,
            UnknownResolution::Tool(ToolCall::new(
                SEARCH_JOBS,
                json!({"role": "Data Analyst", "location": "Denver"})
            ))
        );
    }

    #[test]
    fn test_message_overrides_profile() {
        let profile = profile_with(json!({"targetRoles": ["Data Analyst"]}));
        match resolve_unknown("find designer jobs in Boston", &profile) {
            UnknownResolution::Tool(call) => {
                assert_eq!(call.input["role"], "Designer");
                assert_eq!(call.input["location"], "Boston");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_apply_without_auto_apply_asks() {
        let profile = profile_with(json!({"targetRoles": ["PM"]}));
        assert!(matches!(
            resolve_unknown("just apply everywhere", &profile),
            UnknownResolution::Clarify(_)
        ));

        let auto = profile_with(json!({"targetRoles": ["PM"], "autoApply": true}));
        assert!(matches!(
            resolve_unknown("just apply everywhere", &auto),
            UnknownResolution::Tool(_)
        ));
    }

    #[test]
    fn test_empty_profile_asks_for_role() {
        assert_eq!(
            resolve_unknown("hmm", &Profile::default()),
            UnknownResolution::Clarify(ASK_FOR_ROLE.to_string())
        );
    }
}
