//! 用户画像：惰性创建、深度合并的偏好文档
//!
//! 合并规则：对象字段递归合并；数组与标量整体替换（不拼接），唯一例外是 memories，
//! 它按 FIFO 追加并保留最近 MAX_MEMORIES 条。每次更新写入 meta.lastUpdated。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::core::AgentError;

/// memories 列表上限
pub const MAX_MEMORIES: usize = 50;

/// 画像无任何数据时的上下文占位
pub const EMPTY_PROFILE_CONTEXT: &str = "No profile information available yet.";

/// 上下文中每个列表最多展示的条目
const CONTEXT_LIST_LIMIT: usize = 5;
/// 上下文中展示的最近记忆条数
const CONTEXT_MEMORY_COUNT: usize = 3;
/// 上下文最大字符数
const CONTEXT_MAX_CHARS: usize = 1200;

/// 画像文档：{preferences, learned, context, memories, meta}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Value);

impl Default for Profile {
    fn default() -> Self {
        let now = Utc::now().to_rfc3339();
        Profile(json!({
            "preferences": {
                "targetRoles": [],
                "locations": [],
                "salaryMin": null,
                "remote": null,
                "autoApply": false
            },
            "learned": {
                "skills": [],
                "industries": []
            },
            "context": {
                "experienceYears": null,
                "currentRole": null,
                "goals": []
            },
            "memories": [],
            "meta": {
                "createdAt": now,
                "lastUpdated": now
            }
        }))
    }
}

impl Profile {
    pub fn from_value(value: Value) -> Self {
        Profile(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn strings_at(&self, pointer: &str) -> Vec<String> {
        self.0
            .pointer(pointer)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .filter(|s| !s.trim().is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn string_at(&self, pointer: &str) -> Option<String> {
        self.0
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn target_roles(&self) -> Vec<String> {
        self.strings_at("/preferences/targetRoles")
    }

    pub fn locations(&self) -> Vec<String> {
        self.strings_at("/preferences/locations")
    }

    pub fn salary_min(&self) -> Option<u64> {
        self.0.pointer("/preferences/salaryMin").and_then(Value::as_u64)
    }

    pub fn auto_apply(&self) -> bool {
        self.0
            .pointer("/preferences/autoApply")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn experience_years(&self) -> Option<f64> {
        self.0.pointer("/context/experienceYears").and_then(Value::as_f64)
    }

    pub fn current_role(&self) -> Option<String> {
        self.string_at("/context/currentRole")
    }

    pub fn goals(&self) -> Vec<String> {
        self.strings_at("/context/goals")
    }

    /// memories 中每项为 {content, createdAt}，兼容纯字符串
    pub fn memories(&self) -> Vec<String> {
        self.0
            .get("memories")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| {
                        m.get("content")
                            .and_then(Value::as_str)
                            .or_else(|| m.as_str())
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.0.pointer("/meta/lastUpdated").and_then(Value::as_str)
    }
}

/// 深度合并：对象按键递归，其余（数组、标量、null）整体替换
pub fn deep_merge(target: &mut Value, updates: &Value) {
    match (target, updates) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                let recurse = value.is_object() && target_map.get(key).is_some_and(Value::is_object);
                if recurse {
                    if let Some(existing) = target_map.get_mut(key) {
                        deep_merge(existing, value);
                    }
                } else {
                    target_map.insert(key.clone(), value.clone());
                }
            }
        }
        (target, updates) => {
            *target = updates.clone();
        }
    }
}

/// 向 memories 追加并裁剪到上限（丢弃最旧）
fn append_memories(document: &mut Value, new_memories: Vec<Value>) {
    if new_memories.is_empty() {
        return;
    }
    let Some(root) = document.as_object_mut() else {
        return;
    };
    let entry = root
        .entry("memories".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(list) = entry {
        list.extend(new_memories);
        if list.len() > MAX_MEMORIES {
            let overflow = list.len() - MAX_MEMORIES;
            list.drain(..overflow);
        }
    }
}

/// 画像持久化接口
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<Profile>, AgentError>;
    async fn save(&self, user_id: &str, profile: &Profile) -> Result<(), AgentError>;
}

/// 进程内画像存储
#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, Profile>>,
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn load(&self, user_id: &str) -> Result<Option<Profile>, AgentError> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, profile: &Profile) -> Result<(), AgentError> {
        self.profiles
            .write()
            .await
            .insert(user_id.to_string(), profile.clone());
        Ok(())
    }
}

/// 画像服务：惰性创建、深度合并更新、渲染规划上下文
pub struct ProfileStore {
    repo: Arc<dyn ProfileRepository>,
}

impl ProfileStore {
    pub fn new(repo: Arc<dyn ProfileRepository>) -> Self {
        Self { repo }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryProfileRepository::default()))
    }

    /// 读取画像；首次访问时创建默认文档并落库
    pub async fn get_user_profile(&self, user_id: &str) -> Result<Profile, AgentError> {
        if let Some(profile) = self.repo.load(user_id).await? {
            return Ok(profile);
        }
        let profile = Profile::default();
        self.repo.save(user_id, &profile).await?;
        tracing::debug!(user_id, "created default profile");
        Ok(profile)
    }

    /// 深度合并 updates（last-write-wins），并写入 meta.lastUpdated
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        updates: &Value,
    ) -> Result<Profile, AgentError> {
        // 根必须是对象，否则 deep_merge 会整体替换文档
        if !updates.is_object() {
            return Err(AgentError::PersistenceError(format!(
                "profile update for {user_id} must be a JSON object, got {updates}"
            )));
        }
        let current = self.get_user_profile(user_id).await?;
        let mut document = current.into_value();

        let mut updates = updates.clone();
        let new_memories = match updates.as_object_mut().and_then(|m| m.remove("memories")) {
            Some(Value::Array(items)) => items,
            Some(single) if !single.is_null() => vec![single],
            _ => Vec::new(),
        };

        deep_merge(&mut document, &updates);
        append_memories(&mut document, new_memories);
        deep_merge(
            &mut document,
            &json!({ "meta": { "lastUpdated": Utc::now().to_rfc3339() } }),
        );

        let profile = Profile(document);
        self.repo.save(user_id, &profile).await?;
        Ok(profile)
    }

    /// 追加一条记忆（FIFO 上限 MAX_MEMORIES）
    pub async fn add_memory(&self, user_id: &str, content: &str) -> Result<Profile, AgentError> {
        let note = json!({ "content": content, "createdAt": Utc::now().to_rfc3339() });
        self.update_user_profile(user_id, &json!({ "memories": [note] }))
            .await
    }

    /// 渲染供 Planner 使用的画像摘要；无数据时返回 EMPTY_PROFILE_CONTEXT
    pub fn get_profile_context(profile: &Profile) -> String {
        let mut lines = Vec::new();

        let roles = profile.target_roles();
        if !roles.is_empty() {
            lines.push(format!("Target roles: {}", join_limited(&roles)));
        }
        let locations = profile.locations();
        if !locations.is_empty() {
            lines.push(format!("Preferred locations: {}", join_limited(&locations)));
        }
        if let Some(salary) = profile.salary_min() {
            lines.push(format!("Minimum salary: ${salary}"));
        }
        if let Some(years) = profile.experience_years() {
            lines.push(format!("Experience: {years} years"));
        }
        if let Some(role) = profile.current_role() {
            lines.push(format!("Current role: {role}"));
        }
        let goals = profile.goals();
        if !goals.is_empty() {
            lines.push(format!("Goals: {}", join_limited(&goals)));
        }
        let memories = profile.memories();
        if !memories.is_empty() {
            let recent = &memories[memories.len().saturating_sub(CONTEXT_MEMORY_COUNT)..];
            lines.push("Recent memories:".to_string());
            lines.extend(recent.iter().map(|m| format!("- {m}")));
        }

        if lines.is_empty() {
            return EMPTY_PROFILE_CONTEXT.to_string();
        }
        let rendered = lines.join("\n");
        if rendered.chars().count() > CONTEXT_MAX_CHARS {
            rendered.chars().take(CONTEXT_MAX_CHARS).collect()
        } else {
            rendered
        }
    }
}

fn join_limited(items: &[String]) -> String {
    items
        .iter()
        .take(CONTEXT_LIST_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}
