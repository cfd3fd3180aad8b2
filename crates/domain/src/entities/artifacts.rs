//! 流水线产物：每一级都引用前一级，阶段状态从任务账本派生

use chrono::{DateTime, Utc};
use pipeline_core::JobStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::PipelineJob;

/// URL抓取的来源站点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Website {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub selectors: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Website {
    pub fn new(name: String, url: String, selectors: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            url,
            selectors,
            created_at: now,
        }
    }
}

/// 生成内容使用的角色设定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub persona: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: String, persona: String, model: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            persona,
            model,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedUrl {
    pub id: String,
    pub website_id: String,
    pub url: String,
    pub title: Option<String>,
    pub produced_by_job_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    pub id: String,
    pub url_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub produced_by_job_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub processing_time_ms: u64,
    pub tokens_used: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub id: String,
    pub content_id: String,
    pub agent_id: String,
    pub text: String,
    pub metadata: GenerationMetadata,
    pub produced_by_job_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishedPost {
    pub id: String,
    pub generated_id: String,
    pub target_id: String,
    pub external_post_id: String,
    pub published_at: DateTime<Utc>,
    pub engagement: Engagement,
    pub produced_by_job_id: String,
}

/// 产物在某个阶段的状态，只读派生自该键最新的任务
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactStatus {
    NotStarted,
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl ArtifactStatus {
    pub fn from_latest_job(job: Option<&PipelineJob>) -> Self {
        match job.map(|j| j.status) {
            None => ArtifactStatus::NotStarted,
            Some(JobStatus::Pending) => ArtifactStatus::Queued,
            Some(JobStatus::Processing) => ArtifactStatus::Processing,
            Some(JobStatus::Completed) => ArtifactStatus::Succeeded,
            Some(JobStatus::Failed) => ArtifactStatus::Failed,
        }
    }
}

/// 列表接口返回的产物及其派生状态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithStatus<T> {
    #[serde(flatten)]
    pub item: T,
    pub status: ArtifactStatus,
}

/// 各类产物数量，供看板统计使用
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCounts {
    pub websites: u64,
    pub urls: u64,
    pub contents: u64,
    pub generated: u64,
    pub posts: u64,
}
