use std::fmt;

use chrono::{DateTime, Utc};
use pipeline_core::{JobStatus, JobType, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `(job_type, source_entity_id)`，同一个键最多只有一个处理中的任务
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobKey {
    pub job_type: JobType,
    pub source_entity_id: String,
}

impl JobKey {
    pub fn new(job_type: JobType, source_entity_id: impl Into<String>) -> Self {
        Self {
            job_type,
            source_entity_id: source_entity_id.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.job_type, self.source_entity_id)
    }
}

/// 创建任务所需的参数
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub source_entity_id: String,
    pub related_config_id: String,
    pub priority: i32,
    pub max_retries: u32,
    pub payload: serde_json::Value,
}

impl NewJob {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.job_type, self.source_entity_id.clone())
    }
}

/// 流水线任务
///
/// 状态转换只能通过下面的方法完成，每次转换都会递增 `version`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJob {
    pub id: String,
    pub job_type: JobType,
    pub source_entity_id: String,
    pub related_config_id: String,
    pub status: JobStatus,
    pub priority: i32,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub version: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineJob {
    pub fn new(new_job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type: new_job.job_type,
            source_entity_id: new_job.source_entity_id,
            related_config_id: new_job.related_config_id,
            status: JobStatus::Pending,
            priority: new_job.priority,
            progress: 0,
            retry_count: 0,
            max_retries: new_job.max_retries,
            error: None,
            payload: new_job.payload,
            result: None,
            version: 1,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.job_type, self.source_entity_id.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    pub fn is_processing(&self) -> bool {
        self.status == JobStatus::Processing
    }

    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }

    fn require(&self, expected: JobStatus, action: &str) -> PipelineResult<()> {
        if self.status != expected {
            return Err(PipelineError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// pending → processing，进度归零
    pub fn claim(&mut self, now: DateTime<Utc>) -> PipelineResult<()> {
        self.require(JobStatus::Pending, "claim")?;
        self.status = JobStatus::Processing;
        self.progress = 0;
        self.error = None;
        self.started_at = Some(now);
        self.completed_at = None;
        self.touch(now);
        Ok(())
    }

    /// 进度只能单调不减
    pub fn update_progress(&mut self, progress: u8, now: DateTime<Utc>) -> PipelineResult<()> {
        self.require(JobStatus::Processing, "progress")?;
        if progress > 100 {
            return Err(PipelineError::validation("progress", "进度必须在0到100之间"));
        }
        if progress < self.progress {
            return Err(PipelineError::ProgressRegression {
                job_id: self.id.clone(),
                current: self.progress,
                requested: progress,
            });
        }
        if progress != self.progress {
            self.progress = progress;
            self.touch(now);
        }
        Ok(())
    }

    pub fn succeed(
        &mut self,
        result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        self.require(JobStatus::Processing, "succeed")?;
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = result;
        self.completed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// processing → failed，重试次数不变；空错误信息会被替换，失败任务的error总是非空
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> PipelineResult<()> {
        self.require(JobStatus::Processing, "fail")?;
        let error = error.into();
        self.status = JobStatus::Failed;
        self.error = Some(if error.trim().is_empty() {
            "未知错误".to_string()
        } else {
            error
        });
        self.completed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// failed → pending，超过重试上限时返回 `RetryExhausted` 且任务不变
    pub fn retry(&mut self, now: DateTime<Utc>) -> PipelineResult<()> {
        self.require(JobStatus::Failed, "retry")?;
        if self.retry_count >= self.max_retries {
            return Err(PipelineError::RetryExhausted {
                job_id: self.id.clone(),
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.status = JobStatus::Pending;
        self.retry_count += 1;
        self.progress = 0;
        self.started_at = None;
        self.completed_at = None;
        self.touch(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> PipelineJob {
        PipelineJob::new(
            NewJob {
                job_type: JobType::GenerateContent,
                source_entity_id: "content-1".to_string(),
                related_config_id: "cfg-1".to_string(),
                priority: 5,
                max_retries: 3,
                payload: json!({"agentId": "agent-1"}),
            },
            Utc::now(),
        )
    }

    fn failed_job(retry_count: u32) -> PipelineJob {
        let mut job = job();
        job.claim(Utc::now()).unwrap();
        job.fail("upstream 500", Utc::now()).unwrap();
        job.retry_count = retry_count;
        job
    }

    #[test]
    fn test_full_lifecycle_bumps_version() {
        let mut job = job();
        assert_eq!(job.version, 1);
        job.claim(Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());
        job.update_progress(40, Utc::now()).unwrap();
        job.succeed(Some(json!({"ok": true})), Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.version, 4);
    }

    #[test]
    fn test_progress_regression_rejected() {
        let mut job = job();
        job.claim(Utc::now()).unwrap();
        job.update_progress(60, Utc::now()).unwrap();
        let err = job.update_progress(30, Utc::now()).unwrap_err();
        assert!(matches!(err, PipelineError::ProgressRegression { current: 60, requested: 30, .. }));
        assert_eq!(job.progress, 60);
    }

    #[test]
    fn test_fail_records_error_and_keeps_retry_count() {
        let mut job = job();
        job.claim(Utc::now()).unwrap();
        job.fail("", Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 0);
        assert!(!job.error.as_deref().unwrap_or_default().is_empty());
    }

    #[test]
    fn test_retry_below_limit_returns_to_pending() {
        let mut job = failed_job(2);
        job.retry(Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 3);
    }

    #[test]
    fn test_retry_at_limit_is_exhausted_and_unchanged() {
        let mut job = failed_job(3);
        let before = job.clone();
        let err = job.retry(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RetryExhausted { retry_count: 3, max_retries: 3, .. }
        ));
        assert_eq!(job, before);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut job = job();
        assert!(matches!(
            job.succeed(None, Utc::now()),
            Err(PipelineError::InvalidTransition { .. })
        ));
        assert!(matches!(job.retry(Utc::now()), Err(PipelineError::InvalidTransition { .. })));
        job.claim(Utc::now()).unwrap();
        assert!(matches!(job.claim(Utc::now()), Err(PipelineError::InvalidTransition { .. })));
    }
}
