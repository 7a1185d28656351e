//! 领域协作方接口：职位检索、简历生成、投递、目标/例程
//!
//! 工具层只依赖这些 trait；http 为真实后端（reqwest JSON），local 为进程内实现。

pub mod http;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpBackend;
pub use local::LocalBackend;

/// 职位检索条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// 一条职位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default)]
    pub remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// 简历生成请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_role: Option<String>,
}

/// 投递回执；同一 user+job 重复投递返回首次回执且 already_applied = true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationReceipt {
    pub application_id: String,
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub already_applied: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    pub title: String,
    /// daily / weekly / ...
    pub cadence: String,
    pub created_at: DateTime<Utc>,
}

/// 职位检索（只读）
#[async_trait]
pub trait JobBoard: Send + Sync {
    async fn search(&self, query: &JobQuery) -> Result<Vec<JobListing>, String>;
}

/// 简历生成（LaTeX/PDF 由协作方负责）
#[async_trait]
pub trait ResumeBuilder: Send + Sync {
    async fn generate(&self, request: &ResumeRequest) -> Result<Value, String>;
}

/// 投递（唯一有副作用的协作方，按 user+job 幂等）
#[async_trait]
pub trait ApplicationSubmitter: Send + Sync {
    async fn submit(
        &self,
        user_id: &str,
        job_id: &str,
        resume_id: Option<&str>,
    ) -> Result<ApplicationReceipt, String>;
}

/// 目标与例程存储
#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn create_goal(
        &self,
        user_id: &str,
        title: &str,
        target_date: Option<&str>,
    ) -> Result<Goal, String>;

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, String>;

    async fn create_routine(
        &self,
        user_id: &str,
        title: &str,
        cadence: &str,
    ) -> Result<Routine, String>;
}
