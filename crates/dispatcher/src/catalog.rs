//! 产物目录：管理实体的创建与带派生状态的产物列表
//!
//! 产物的阶段状态不单独存储，读取时从任务账本中该键最新的任务派生。

use std::sync::Arc;

use pipeline_core::{Clock, JobType, PipelineError, PipelineResult};
use pipeline_domain::{
    Agent, ArtifactCounts, ArtifactRepository, ArtifactStatus, ExtractedContent, ExtractedUrl,
    GeneratedContent, Page, PageRequest, PublishTarget, PublishedPost, PublishingPolicy, Website,
    WithStatus,
};
use serde::Deserialize;
use tracing::info;

use crate::job_ledger::JobLedger;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebsiteRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub selectors: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
    pub persona: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetRequest {
    pub name: String,
    pub page_id: String,
    pub config_id: String,
    #[serde(default)]
    pub policy: PublishingPolicy,
}

fn require_non_empty(field: &str, value: &str) -> PipelineResult<()> {
    if value.trim().is_empty() {
        return Err(PipelineError::validation(field, "不能为空"));
    }
    Ok(())
}

pub struct ArtifactCatalog {
    artifacts: Arc<dyn ArtifactRepository>,
    ledger: Arc<JobLedger>,
    clock: Arc<dyn Clock>,
}

impl ArtifactCatalog {
    pub fn new(
        artifacts: Arc<dyn ArtifactRepository>,
        ledger: Arc<JobLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            artifacts,
            ledger,
            clock,
        }
    }

    pub async fn create_website(&self, request: CreateWebsiteRequest) -> PipelineResult<Website> {
        require_non_empty("name", &request.name)?;
        if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
            return Err(PipelineError::validation("url", "必须是http或https地址"));
        }
        let website = Website::new(
            request.name,
            request.url,
            request.selectors,
            self.clock.now(),
        );
        let saved = self.artifacts.save_website(&website).await?;
        info!("已创建站点: {} ({})", saved.name, saved.id);
        Ok(saved)
    }

    pub async fn create_agent(&self, request: CreateAgentRequest) -> PipelineResult<Agent> {
        require_non_empty("name", &request.name)?;
        require_non_empty("model", &request.model)?;
        let agent = Agent::new(request.name, request.persona, request.model, self.clock.now());
        self.artifacts.save_agent(&agent).await
    }

    pub async fn create_target(&self, request: CreateTargetRequest) -> PipelineResult<PublishTarget> {
        require_non_empty("name", &request.name)?;
        require_non_empty("pageId", &request.page_id)?;
        let mut policy = request.policy;
        policy.validate()?;
        let now = self.clock.now();
        policy.stamp_posts_today(now);
        let target = PublishTarget::new(
            request.name,
            request.page_id,
            request.config_id,
            policy,
            now,
        );
        self.artifacts.save_target(&target).await
    }

    pub async fn list_agents(&self) -> PipelineResult<Vec<Agent>> {
        self.artifacts.list_agents().await
    }

    pub async fn list_targets(&self) -> PipelineResult<Vec<PublishTarget>> {
        self.artifacts.list_targets().await
    }

    /// 站点的状态取自它的URL抓取任务
    pub async fn list_websites(&self) -> PipelineResult<Vec<WithStatus<Website>>> {
        let websites = self.artifacts.list_websites().await?;
        self.decorate(websites, JobType::ExtractUrls, |w| &w.id).await
    }

    pub async fn list_urls(&self, page: PageRequest) -> PipelineResult<Page<WithStatus<ExtractedUrl>>> {
        let urls = self.artifacts.list_urls(page).await?;
        self.decorate_page(urls, JobType::ExtractContent, |u| &u.id).await
    }

    pub async fn list_contents(
        &self,
        page: PageRequest,
    ) -> PipelineResult<Page<WithStatus<ExtractedContent>>> {
        let contents = self.artifacts.list_contents(page).await?;
        self.decorate_page(contents, JobType::GenerateContent, |c| &c.id).await
    }

    pub async fn list_generated(
        &self,
        page: PageRequest,
    ) -> PipelineResult<Page<WithStatus<GeneratedContent>>> {
        let generated = self.artifacts.list_generated(page).await?;
        self.decorate_page(generated, JobType::Publish, |g| &g.id).await
    }

    pub async fn list_posts(&self, page: PageRequest) -> PipelineResult<Page<WithStatus<PublishedPost>>> {
        let posts = self.artifacts.list_posts(page).await?;
        self.decorate_page(posts, JobType::SyncEngagement, |p| &p.id).await
    }

    pub async fn counts(&self) -> PipelineResult<ArtifactCounts> {
        self.artifacts.counts().await
    }

    /// 某个产物在下一阶段的状态
    pub async fn status_of(
        &self,
        job_type: JobType,
        source_entity_id: &str,
    ) -> PipelineResult<ArtifactStatus> {
        let latest = self.ledger.latest_for_key(job_type, source_entity_id).await?;
        Ok(ArtifactStatus::from_latest_job(latest.as_ref()))
    }

    async fn decorate<T>(
        &self,
        items: Vec<T>,
        job_type: JobType,
        id_of: impl Fn(&T) -> &String,
    ) -> PipelineResult<Vec<WithStatus<T>>> {
        let mut decorated = Vec::with_capacity(items.len());
        for item in items {
            let status = self.status_of(job_type, id_of(&item)).await?;
            decorated.push(WithStatus { item, status });
        }
        Ok(decorated)
    }

    async fn decorate_page<T>(
        &self,
        page: Page<T>,
        job_type: JobType,
        id_of: impl Fn(&T) -> &String,
    ) -> PipelineResult<Page<WithStatus<T>>> {
        Ok(Page {
            total: page.total,
            items: self.decorate(page.items, job_type, id_of).await?,
        })
    }
}
