//! 推送事件
//!
//! 事件名形如 `generation-started`，每个事件都带上任务的 `version`，
//! 对账器据此丢弃过期或重复的事件。

use std::fmt;

use chrono::{DateTime, Utc};
use pipeline_core::{JobStatus, JobType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{JobKey, PipelineJob};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Started,
    Progress,
    Completed,
    Failed,
}

impl EventPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPhase::Started => "started",
            EventPhase::Progress => "progress",
            EventPhase::Completed => "completed",
            EventPhase::Failed => "failed",
        }
    }

    /// 事件对应的任务状态
    pub fn job_status(&self) -> JobStatus {
        match self {
            EventPhase::Started | EventPhase::Progress => JobStatus::Processing,
            EventPhase::Completed => JobStatus::Completed,
            EventPhase::Failed => JobStatus::Failed,
        }
    }
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    pub event_id: Uuid,
    pub phase: EventPhase,
    pub job_id: String,
    pub job_type: JobType,
    pub source_entity_id: String,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_extracted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PipelineEvent {
    /// 根据任务当前快照构造事件
    pub fn from_job(job: &PipelineJob, phase: EventPhase, now: DateTime<Utc>) -> Self {
        let result = job.result.as_ref();
        Self {
            event_id: Uuid::new_v4(),
            phase,
            job_id: job.id.clone(),
            job_type: job.job_type,
            source_entity_id: job.source_entity_id.clone(),
            version: job.version,
            timestamp: now,
            agent_id: job
                .payload
                .get("agentId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            percentage: (phase == EventPhase::Progress).then_some(job.progress),
            posts_extracted: result
                .and_then(|r| r.get("postsExtracted"))
                .and_then(|v| v.as_u64()),
            metadata: result.and_then(|r| r.get("metadata")).cloned(),
            error: if phase == EventPhase::Failed {
                job.error.clone()
            } else {
                None
            },
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// 推送通道上的事件名，例如 `extraction-progress`
    pub fn name(&self) -> String {
        format!("{}-{}", self.job_type.stage(), self.phase)
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.job_type, self.source_entity_id.clone())
    }
}
