//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use std::collections::HashMap;

use async_trait::async_trait;
use pipeline_core::{JobStatus, JobType, PipelineResult, ProviderScope};
use serde::{Deserialize, Serialize};

use crate::entities::{
    Agent, ArtifactCounts, ExtractedContent, ExtractedUrl, GeneratedContent, PipelineJob,
    ProviderConfig, PublishTarget, PublishedPost, UsageCounters, Website,
};

/// 分页查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// 分页参数，页码从1开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, 200),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }

    /// 对内存中的列表切页
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset())
            .take(self.page_size as usize)
            .cloned()
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
}

impl JobFilter {
    pub fn matches(&self, job: &PipelineJob) -> bool {
        self.job_type.map_or(true, |t| t == job.job_type)
            && self.status.map_or(true, |s| s == job.status)
    }
}

/// 提供方配置仓储
///
/// `update` 只写管理字段，用量只能通过 `save_usage` 写入，
/// 激活状态只能通过 `activate_exclusive` 改变。
#[async_trait]
pub trait ProviderConfigRepository: Send + Sync {
    async fn create(&self, config: &ProviderConfig) -> PipelineResult<ProviderConfig>;
    async fn find_by_id(&self, id: &str) -> PipelineResult<Option<ProviderConfig>>;
    async fn find_all(&self) -> PipelineResult<Vec<ProviderConfig>>;
    async fn find_active(&self, scope: ProviderScope) -> PipelineResult<Option<ProviderConfig>>;
    async fn update(&self, config: &ProviderConfig) -> PipelineResult<ProviderConfig>;
    async fn save_usage(&self, id: &str, usage: &UsageCounters) -> PipelineResult<()>;
    /// 在同一个原子操作中停用同作用域的其他配置并激活目标
    async fn activate_exclusive(&self, id: &str) -> PipelineResult<ProviderConfig>;
    async fn delete(&self, id: &str) -> PipelineResult<bool>;
}

/// 任务仓储
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &PipelineJob) -> PipelineResult<PipelineJob>;
    async fn find_by_id(&self, id: &str) -> PipelineResult<Option<PipelineJob>>;
    async fn update(&self, job: &PipelineJob) -> PipelineResult<PipelineJob>;
    /// 同一个键下的全部任务，按创建时间升序
    async fn find_by_key(
        &self,
        job_type: JobType,
        source_entity_id: &str,
    ) -> PipelineResult<Vec<PipelineJob>>;
    /// 按更新时间倒序
    async fn list(&self, filter: &JobFilter, page: PageRequest) -> PipelineResult<Page<PipelineJob>>;
    /// 按 `priority`、`created_at` 升序返回待处理任务，跳过前 `offset` 个
    async fn find_pending(&self, offset: usize, limit: usize) -> PipelineResult<Vec<PipelineJob>>;
    async fn find_pending_by_type(&self, job_type: JobType) -> PipelineResult<Vec<PipelineJob>>;
    /// 仅当任务仍处于待处理时删除，返回是否删除
    async fn delete_if_pending(&self, id: &str) -> PipelineResult<bool>;
    async fn count_by_status(&self) -> PipelineResult<HashMap<JobStatus, u64>>;
    async fn count_pending_by_type(&self) -> PipelineResult<HashMap<JobType, u64>>;
}

/// 流水线产物及其管理实体的仓储
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn save_website(&self, website: &Website) -> PipelineResult<Website>;
    async fn find_website(&self, id: &str) -> PipelineResult<Option<Website>>;
    async fn list_websites(&self) -> PipelineResult<Vec<Website>>;

    async fn save_agent(&self, agent: &Agent) -> PipelineResult<Agent>;
    async fn find_agent(&self, id: &str) -> PipelineResult<Option<Agent>>;
    async fn list_agents(&self) -> PipelineResult<Vec<Agent>>;

    async fn save_target(&self, target: &PublishTarget) -> PipelineResult<PublishTarget>;
    async fn find_target(&self, id: &str) -> PipelineResult<Option<PublishTarget>>;
    async fn list_targets(&self) -> PipelineResult<Vec<PublishTarget>>;

    async fn save_url(&self, url: &ExtractedUrl) -> PipelineResult<ExtractedUrl>;
    async fn find_url(&self, id: &str) -> PipelineResult<Option<ExtractedUrl>>;
    async fn find_url_by_address(
        &self,
        website_id: &str,
        url: &str,
    ) -> PipelineResult<Option<ExtractedUrl>>;
    async fn list_urls(&self, page: PageRequest) -> PipelineResult<Page<ExtractedUrl>>;

    async fn save_content(&self, content: &ExtractedContent) -> PipelineResult<ExtractedContent>;
    async fn find_content(&self, id: &str) -> PipelineResult<Option<ExtractedContent>>;
    async fn list_contents(&self, page: PageRequest) -> PipelineResult<Page<ExtractedContent>>;

    async fn save_generated(&self, generated: &GeneratedContent) -> PipelineResult<GeneratedContent>;
    async fn find_generated(&self, id: &str) -> PipelineResult<Option<GeneratedContent>>;
    async fn list_generated(&self, page: PageRequest) -> PipelineResult<Page<GeneratedContent>>;

    async fn save_post(&self, post: &PublishedPost) -> PipelineResult<PublishedPost>;
    async fn find_post(&self, id: &str) -> PipelineResult<Option<PublishedPost>>;
    async fn list_posts(&self, page: PageRequest) -> PipelineResult<Page<PublishedPost>>;

    async fn counts(&self) -> PipelineResult<ArtifactCounts>;
}
