//! HTTP 协作方：把各领域调用转为 JSON 请求发往 backend_url
//!
//! 超时由 reqwest Client 自身控制（协作方超时），工具层不再额外设限。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::integrations::{
    ApplicationReceipt, ApplicationSubmitter, Goal, GoalStore, JobBoard, JobListing, JobQuery,
    ResumeBuilder, ResumeRequest, Routine,
};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("jobpilot/0.1")
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, String> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request to {path} failed: {e}"))?;
        Self::decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, String> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| format!("request to {path} failed: {e}"))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T, String> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(format!("{path} returned {status}: {preview}"));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| format!("invalid response from {path}: {e}"))
    }
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<JobListing>,
}

#[async_trait]
impl JobBoard for HttpBackend {
    async fn search(&self, query: &JobQuery) -> Result<Vec<JobListing>, String> {
        let body = serde_json::to_value(query).map_err(|e| e.to_string())?;
        let response: SearchResponse = self.post("jobs/search", &body).await?;
        Ok(response.items)
    }
}

#[async_trait]
impl ResumeBuilder for HttpBackend {
    async fn generate(&self, request: &ResumeRequest) -> Result<Value, String> {
        let body = serde_json::to_value(request).map_err(|e| e.to_string())?;
        self.post("resumes", &body).await
    }
}

#[async_trait]
impl ApplicationSubmitter for HttpBackend {
    async fn submit(
        &self,
        user_id: &str,
        job_id: &str,
        resume_id: Option<&str>,
    ) -> Result<ApplicationReceipt, String> {
        let body = json!({ "userId": user_id, "jobId": job_id, "resumeId": resume_id });
        self.post("applications", &body).await
    }
}

#[async_trait]
impl GoalStore for HttpBackend {
    async fn create_goal(
        &self,
        user_id: &str,
        title: &str,
        target_date: Option<&str>,
    ) -> Result<Goal, String> {
        let body = json!({ "userId": user_id, "title": title, "targetDate": target_date });
        self.post("goals", &body).await
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, String> {
        self.get("goals", &[("userId", user_id)]).await
    }

    async fn create_routine(
        &self,
        user_id: &str,
        title: &str,
        cadence: &str,
    ) -> Result<Routine, String> {
        let body = json!({ "userId": user_id, "title": title, "cadence": cadence });
        self.post("routines", &body).await
    }
}
