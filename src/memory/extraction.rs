//! 画像信息抽取
//!
//! - extract_quick_facts：每轮执行的正则抽取（当前职位、年限、目标职位/地点、薪资下限、"remember:" 笔记）
//! - ProfileExtractor：每第 3 条消息执行一次的模型抽取，结果转为深度合并更新
//! - parse_job_query：从 "find X jobs in Y" 一类语句中解析职位与地点

use std::sync::{Arc, OnceLock};

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::llm::{LlmClient, ResponseSchema};
use crate::memory::Message;

/// 全量抽取的消息间隔
pub const FULL_EXTRACTION_INTERVAL: usize = 3;

/// 抽取时送入模型的最近消息数
const EXTRACTION_WINDOW: usize = 10;

/// 会话消息数为 3、6、9… 时执行全量抽取
pub fn should_run_full_extraction(message_count: usize) -> bool {
    message_count > 0 && message_count % FULL_EXTRACTION_INTERVAL == 0
}

static JOB_QUERY_RE: OnceLock<Option<Regex>> = OnceLock::new();
static CURRENT_ROLE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static EXPERIENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static SALARY_RE: OnceLock<Option<Regex>> = OnceLock::new();
static REMEMBER_RE: OnceLock<Option<Regex>> = OnceLock::new();
static REMOTE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static NO_REMOTE_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn job_query_re() -> Option<&'static Regex> {
    cached(
        &JOB_QUERY_RE,
        r"(?i)\b(?:find|search(?:\s+for)?|look(?:ing)?\s+for|show(?:\s+me)?|get|want|need)\s+(?:me\s+)?(?:some\s+|a\s+|an\s+)?(?:remote\s+)?([a-z][a-z /&+\-]*?)\s+(?:jobs?|roles?|positions?|openings?)\b(?:\s+(?:in|near|around|at)\s+([a-z][a-z .,\-]*[a-z]))?",
    )
}

fn current_role_re() -> Option<&'static Regex> {
    cached(
        &CURRENT_ROLE_RE,
        r"(?i)\b(?:i'?m|i am|i work as|currently)\s+(?:a|an|working as an?)\s+([a-z][a-z /&+\-]{2,40}?)(?:\s+(?:at|in|with|for)\b|[.,!]|$)",
    )
}

fn experience_re() -> Option<&'static Regex> {
    cached(&EXPERIENCE_RE, r"(?i)\b(\d{1,2}(?:\.\d)?)\+?\s+years?\s+(?:of\s+)?experience\b")
}

fn salary_re() -> Option<&'static Regex> {
    cached(
        &SALARY_RE,
        r"(?i)\$\s?(\d{2,3})\s?k\b|\$\s?(\d{2,3}(?:,\d{3})+|\d{5,7})\b|\b(\d{2,3}(?:,\d{3})+)\b",
    )
}

fn remember_re() -> Option<&'static Regex> {
    cached(&REMEMBER_RE, r"(?i)\bremember(?:\s+that)?\s*:?\s+(.{3,200})$")
}

fn remote_re() -> Option<&'static Regex> {
    cached(&REMOTE_RE, r"(?i)\bremote\b")
}

/// 否定词后至多三个词内出现 remote，如 "don't want remote work"、"not interested in remote roles"
fn no_remote_re() -> Option<&'static Regex> {
    cached(
        &NO_REMOTE_RE,
        r"(?i)\b(?:not|no|don['’]?t|do not|never|without|avoid)\b(?:\s+[a-z'’]+){0,3}?\s+remote\b|\bnon-remote\b|\bon-?site only\b",
    )
}

/// 远程偏好：否定表述为 false，肯定提及为 true，未提及为 None
fn parse_remote(text: &str) -> Option<bool> {
    if no_remote_re().is_some_and(|re| re.is_match(text)) {
        return Some(false);
    }
    remote_re().is_some_and(|re| re.is_match(text)).then_some(true)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 解析职位检索语句；职位转为 Title Case，地点保持原样（去首尾空白与标点）
pub fn parse_job_query(text: &str) -> (Option<String>, Option<String>) {
    let Some(caps) = job_query_re().and_then(|re| re.captures(text)) else {
        return (None, None);
    };
    let role = caps
        .get(1)
        .map(|m| m.as_str().trim())
        .filter(|r| !r.is_empty() && !matches!(r.to_lowercase().as_str(), "any" | "some" | "new" | "more"))
        .map(title_case);
    let location = caps
        .get(2)
        .map(|m| m.as_str().trim().trim_end_matches(['.', ',']).to_string())
        .filter(|l| !l.is_empty());
    (role, location)
}

fn parse_salary(text: &str) -> Option<u64> {
    let caps = salary_re()?.captures(text)?;
    if let Some(k) = caps.get(1) {
        return k.as_str().parse::<u64>().ok().map(|n| n * 1000);
    }
    caps.get(2)
        .or_else(|| caps.get(3))
        .and_then(|m| m.as_str().replace(',', "").parse::<u64>().ok())
        .filter(|n| *n >= 10_000)
}

/// 模式抽取：返回可直接交给 update_user_profile 的更新文档；没有命中时返回 None
pub fn extract_quick_facts(message: &str) -> Option<Value> {
    let mut preferences = Map::new();
    let mut context = Map::new();
    let mut updates = Map::new();

    let (role, location) = parse_job_query(message);
    if let Some(role) = role {
        preferences.insert("targetRoles".into(), json!([role]));
    }
    if let Some(location) = location {
        preferences.insert("locations".into(), json!([location]));
    }
    if let Some(remote) = parse_remote(message) {
        preferences.insert("remote".into(), Value::Bool(remote));
    }
    if let Some(salary) = parse_salary(message) {
        preferences.insert("salaryMin".into(), json!(salary));
    }
    if let Some(caps) = current_role_re().and_then(|re| re.captures(message)) {
        let role = caps[1].trim();
        if !role.is_empty() {
            context.insert("currentRole".into(), json!(title_case(role)));
        }
    }
    if let Some(years) = experience_re()
        .and_then(|re| re.captures(message))
        .and_then(|caps| caps[1].parse::<f64>().ok())
    {
        context.insert("experienceYears".into(), json!(years));
    }
    if let Some(caps) = remember_re().and_then(|re| re.captures(message.trim())) {
        updates.insert("memories".into(), json!([caps[1].trim()]));
    }

    if !preferences.is_empty() {
        updates.insert("preferences".into(), Value::Object(preferences));
    }
    if !context.is_empty() {
        updates.insert("context".into(), Value::Object(context));
    }
    (!updates.is_empty()).then_some(Value::Object(updates))
}

/// 模型抽取的结构化结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedProfile {
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub salary_min: Option<u64>,
    #[serde(default)]
    pub remote: Option<bool>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub current_role: Option<String>,
    #[serde(default)]
    pub goals: Vec<String>,
}

impl ExtractedProfile {
    /// 转为深度合并更新；空列表与 None 不写入，避免清掉已有偏好
    pub fn into_update(self) -> Option<Value> {
        let mut preferences = Map::new();
        let mut learned = Map::new();
        let mut context = Map::new();

        if !self.target_roles.is_empty() {
            preferences.insert("targetRoles".into(), json!(self.target_roles));
        }
        if !self.locations.is_empty() {
            preferences.insert("locations".into(), json!(self.locations));
        }
        if let Some(salary) = self.salary_min {
            preferences.insert("salaryMin".into(), json!(salary));
        }
        if let Some(remote) = self.remote {
            preferences.insert("remote".into(), json!(remote));
        }
        if !self.skills.is_empty() {
            learned.insert("skills".into(), json!(self.skills));
        }
        if !self.industries.is_empty() {
            learned.insert("industries".into(), json!(self.industries));
        }
        if let Some(years) = self.experience_years {
            context.insert("experienceYears".into(), json!(years));
        }
        if let Some(role) = self.current_role.filter(|r| !r.trim().is_empty()) {
            context.insert("currentRole".into(), json!(role));
        }
        if !self.goals.is_empty() {
            context.insert("goals".into(), json!(self.goals));
        }

        let mut update = Map::new();
        for (key, section) in [("preferences", preferences), ("learned", learned), ("context", context)] {
            if !section.is_empty() {
                update.insert(key.into(), Value::Object(section));
            }
        }
        (!update.is_empty()).then_some(Value::Object(update))
    }
}

const EXTRACTION_PROMPT: &str = "Extract durable job-search facts about the user from the conversation. \
Only include facts the user stated about themselves. Leave fields empty when unknown. \
Respond with a single JSON object.";

/// 模型抽取器
pub struct ProfileExtractor {
    llm: Arc<dyn LlmClient>,
    schema: ResponseSchema,
}

impl ProfileExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let schema = serde_json::to_value(schema_for!(ExtractedProfile)).unwrap_or(Value::Null);
        Self {
            llm,
            schema: ResponseSchema::new("extracted_profile", schema),
        }
    }

    /// 对最近的 user/assistant 消息做一次结构化抽取，返回深度合并更新
    pub async fn extract(&self, history: &[Message]) -> Result<Option<Value>, AgentError> {
        let start = history.len().saturating_sub(EXTRACTION_WINDOW);
        let transcript = history[start..]
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        if transcript.trim().is_empty() {
            return Ok(None);
        }
        let prompt = vec![Message::system(EXTRACTION_PROMPT), Message::user(transcript)];
        let output = self
            .llm
            .complete(&prompt, Some(&self.schema))
            .await
            .map_err(AgentError::LlmError)?;
        let json = crate::planning::extract_json(&output)
            .ok_or_else(|| AgentError::MalformedPlan("no JSON object in extraction output".into()))?;
        let extracted: ExtractedProfile = serde_json::from_str(json)
            .map_err(|e| AgentError::MalformedPlan(format!("extraction output: {e}")))?;
        Ok(extracted.into_update())
    }
}
