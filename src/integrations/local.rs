//! 进程内协作方：内置职位目录、幂等投递台账、目标/例程表
//!
//! 未配置 backend_url 时由 builder 使用；测试也用它构造确定性的检索结果（包括空结果）。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::integrations::{
    ApplicationReceipt, ApplicationSubmitter, Goal, GoalStore, JobBoard, JobListing, JobQuery,
    ResumeBuilder, ResumeRequest, Routine,
};

const DEFAULT_LIMIT: usize = 10;

#[derive(Default)]
pub struct LocalBackend {
    listings: Vec<JobListing>,
    /// (user_id, job_id) -> 首次回执
    applications: RwLock<HashMap<(String, String), ApplicationReceipt>>,
    goals: RwLock<HashMap<String, Vec<Goal>>>,
    routines: RwLock<HashMap<String, Vec<Routine>>>,
}

impl LocalBackend {
    pub fn new(listings: Vec<JobListing>) -> Self {
        Self {
            listings,
            ..Self::default()
        }
    }

    /// 无后端配置时 REPL 使用的示例目录
    pub fn with_sample_listings() -> Self {
        let sample = [
            ("pm-aus-1", "Senior Product Manager", "Lonestar Analytics", "Austin, TX", false, 165_000),
            ("pm-nyc-1", "Product Manager", "Harbor Health", "New York, NY", false, 150_000),
            ("swe-rem-1", "Backend Software Engineer", "Cloudline", "Remote", true, 140_000),
            ("de-sea-1", "Data Engineer", "Evergreen Retail", "Seattle, WA", false, 145_000),
            ("ux-aus-1", "UX Designer", "Pecan Labs", "Austin, TX", true, 120_000),
        ];
        Self::new(
            sample
                .into_iter()
                .map(|(id, title, company, location, remote, salary)| JobListing {
                    id: id.to_string(),
                    title: title.to_string(),
                    company: company.to_string(),
                    location: location.to_string(),
                    remote,
                    salary_min: Some(salary),
                    url: None,
                })
                .collect(),
        )
    }

    pub fn listings(&self) -> &[JobListing] {
        &self.listings
    }

    fn matches(listing: &JobListing, query: &JobQuery) -> bool {
        let title = listing.title.to_lowercase();
        let role_ok = query
            .role
            .to_lowercase()
            .split_whitespace()
            .all(|word| title.contains(word));
        let location_ok = match &query.location {
            Some(loc) => {
                let wanted = loc.split(',').next().unwrap_or(loc).trim().to_lowercase();
                listing.location.to_lowercase().contains(&wanted)
                    || (listing.remote && wanted == "remote")
            }
            None => true,
        };
        let remote_ok = match query.remote {
            Some(true) => listing.remote,
            _ => true,
        };
        let salary_ok = match (query.salary_min, listing.salary_min) {
            (Some(min), Some(offered)) => offered >= min,
            _ => true,
        };
        role_ok && location_ok && remote_ok && salary_ok
    }
}

#[async_trait]
impl JobBoard for LocalBackend {
    async fn search(&self, query: &JobQuery) -> Result<Vec<JobListing>, String> {
        let limit = query.limit.map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);
        Ok(self
            .listings
            .iter()
            .filter(|l| Self::matches(l, query))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ResumeBuilder for LocalBackend {
    async fn generate(&self, request: &ResumeRequest) -> Result<Value, String> {
        let target = request
            .job_id
            .as_deref()
            .and_then(|id| self.listings.iter().find(|l| l.id == id))
            .map(|l| l.title.clone())
            .or_else(|| request.target_role.clone())
            .unwrap_or_else(|| "general".to_string());
        Ok(json!({
            "resumeId": format!("resume_{}", uuid::Uuid::new_v4()),
            "targetRole": target,
            "format": "markdown",
            "status": "generated"
        }))
    }
}

#[async_trait]
impl ApplicationSubmitter for LocalBackend {
    async fn submit(
        &self,
        user_id: &str,
        job_id: &str,
        _resume_id: Option<&str>,
    ) -> Result<ApplicationReceipt, String> {
        if !self.listings.iter().any(|l| l.id == job_id) {
            return Err(format!("job {job_id} not found"));
        }
        let key = (user_id.to_string(), job_id.to_string());
        let mut applications = self.applications.write().await;
        if let Some(existing) = applications.get(&key) {
            return Ok(ApplicationReceipt {
                already_applied: true,
                ..existing.clone()
            });
        }
        let receipt = ApplicationReceipt {
            application_id: format!("app_{}", uuid::Uuid::new_v4()),
            job_id: job_id.to_string(),
            status: "submitted".to_string(),
            already_applied: false,
            submitted_at: Utc::now(),
        };
        applications.insert(key, receipt.clone());
        Ok(receipt)
    }
}

#[async_trait]
impl GoalStore for LocalBackend {
    async fn create_goal(
        &self,
        user_id: &str,
        title: &str,
        target_date: Option<&str>,
    ) -> Result<Goal, String> {
        let goal = Goal {
            id: format!("goal_{}", uuid::Uuid::new_v4()),
            title: title.to_string(),
            target_date: target_date.map(str::to_string),
            created_at: Utc::now(),
        };
        self.goals
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(goal.clone());
        Ok(goal)
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, String> {
        Ok(self
            .goals
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_routine(
        &self,
        user_id: &str,
        title: &str,
        cadence: &str,
    ) -> Result<Routine, String> {
        let routine = Routine {
            id: format!("routine_{}", uuid::Uuid::new_v4()),
            title: title.to_string(),
            cadence: cadence.to_string(),
            created_at: Utc::now(),
        };
        self.routines
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(routine.clone());
        Ok(routine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, title: &str, location: &str) -> JobListing {
        JobListing {
            id: id.to_string(),
            title: title.to_string(),
            company: "Acme".to_string(),
            location: location.to_string(),
            remote: false,
            salary_min: Some(120_000),
            url: None,
        }
    }

    #[tokio::test]
    async fn test_search_filters_by_role_and_location() {
        let backend = LocalBackend::new(vec![
            listing("1", "Senior Product Manager", "Austin, TX"),
            listing("2", "Product Manager", "Seattle, WA"),
            listing("3", "Data Engineer", "Austin, TX"),
        ]);
        let hits = backend
            .search(&JobQuery {
                role: "Product Manager".into(),
                location: Some("Austin, TX".into()),
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[tokio::test]
    async fn test_submit_is_idempotent_per_user_and_job() {
        let backend = LocalBackend::new(vec![listing("1", "PM", "Austin")]);
        let first = backend.submit("u1", "1", None).await.unwrap();
        let second = backend.submit("u1", "1", None).await.unwrap();
        assert!(!first.already_applied);
        assert!(second.already_applied);
        assert_eq!(first.application_id, second.application_id);

        let other_user = backend.submit("u2", "1", None).await.unwrap();
        assert_ne!(other_user.application_id, first.application_id);
        assert!(backend.submit("u1", "missing", None).await.is_err());
    }
}
