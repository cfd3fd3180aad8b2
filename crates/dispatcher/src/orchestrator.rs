//! 阶段编排
//!
//! 每个阶段的流程相同：校验前置产物，申请任务，调用提供方，
//! 成功时写入产物并完成任务，失败时记录错误。

use std::collections::HashSet;
use std::sync::Arc;

use pipeline_core::{Clock, JobType, PipelineError, PipelineResult, ProviderScope};
use pipeline_domain::{
    publishing::check_publish_allowed, ArtifactRepository, Engagement, ExtractedContent,
    ExtractedUrl, GeneratedContent, PipelineJob, ProviderConfig, ProviderRequest,
    ProviderResolver, ProviderResponse, PublishedPost,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config_selector::ConfigSelector;
use crate::job_ledger::{Admission, DispatchRequest, JobLedger};
use crate::keyed_lock::KeyedLocks;

/// 阶段写入的产物
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StageArtifact {
    Urls(Vec<ExtractedUrl>),
    Content(ExtractedContent),
    Generated(GeneratedContent),
    Post(PublishedPost),
}

/// 一次阶段请求的结果
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Completed {
        job: PipelineJob,
        artifact: StageArtifact,
    },
    /// 准入控制推迟了执行，`job` 为保持待处理或正在处理的任务
    Deferred {
        job: Option<PipelineJob>,
        reason: PipelineError,
    },
}

impl StageOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }
}

/// 一轮队列排空的统计
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub examined: usize,
    pub completed: usize,
    pub deferred: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct StageOrchestrator {
    ledger: Arc<JobLedger>,
    selector: Arc<ConfigSelector>,
    artifacts: Arc<dyn ArtifactRepository>,
    providers: Arc<dyn ProviderResolver>,
    clock: Arc<dyn Clock>,
    target_locks: KeyedLocks<String>,
}

fn payload_str<'a>(payload: &'a serde_json::Value, field: &str) -> PipelineResult<&'a str> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::validation(field, "缺少必填参数"))
}

impl StageOrchestrator {
    pub fn new(
        ledger: Arc<JobLedger>,
        selector: Arc<ConfigSelector>,
        artifacts: Arc<dyn ArtifactRepository>,
        providers: Arc<dyn ProviderResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            selector,
            artifacts,
            providers,
            clock,
            target_locks: KeyedLocks::new(),
        }
    }

    pub async fn extract_urls(&self, website_id: &str) -> PipelineResult<StageOutcome> {
        self.run(JobType::ExtractUrls, website_id, json!({})).await
    }

    pub async fn extract_content(&self, url_id: &str) -> PipelineResult<StageOutcome> {
        self.run(JobType::ExtractContent, url_id, json!({})).await
    }

    pub async fn generate_content(
        &self,
        content_id: &str,
        agent_id: &str,
        reference_content: Option<String>,
    ) -> PipelineResult<StageOutcome> {
        let mut payload = json!({ "agentId": agent_id });
        if let Some(reference) = reference_content {
            payload["referenceContent"] = json!(reference);
        }
        self.run(JobType::GenerateContent, content_id, payload).await
    }

    pub async fn publish(&self, generated_id: &str, target_id: &str) -> PipelineResult<StageOutcome> {
        self.run(JobType::Publish, generated_id, json!({ "targetId": target_id }))
            .await
    }

    pub async fn sync_engagement(&self, post_id: &str) -> PipelineResult<StageOutcome> {
        self.run(JobType::SyncEngagement, post_id, json!({})).await
    }

    /// 发布目标的策略检查与发布计数需要和发布本身串行
    async fn lock_target(
        &self,
        job_type: JobType,
        source_entity_id: &str,
        payload: &serde_json::Value,
    ) -> PipelineResult<Option<OwnedMutexGuard<()>>> {
        if job_type != JobType::Publish {
            return Ok(None);
        }
        let target_id = payload_str(payload, "targetId")?.to_string();
        debug!("锁定发布目标 {} (generated={})", target_id, source_entity_id);
        Ok(Some(self.target_locks.lock(&target_id).await))
    }

    #[instrument(skip(self, payload))]
    async fn run(
        &self,
        job_type: JobType,
        source_entity_id: &str,
        payload: serde_json::Value,
    ) -> PipelineResult<StageOutcome> {
        let _target_guard = self.lock_target(job_type, source_entity_id, &payload).await?;
        let (config, request) = self.prepare(job_type, source_entity_id, &payload).await?;

        match self.check_policy(&request) {
            Ok(()) => {}
            Err(reason @ PipelineError::PublishingBlocked { .. }) => {
                return Ok(StageOutcome::Deferred { job: None, reason });
            }
            Err(e) => return Err(e),
        }

        let admission = self
            .ledger
            .dispatch(DispatchRequest {
                job_type,
                source_entity_id: source_entity_id.to_string(),
                related_config_id: config.id.clone(),
                payload,
                priority: None,
            })
            .await?;

        match admission {
            Admission::Claimed(job) => self.execute(job, &config, request).await,
            Admission::Deferred { job, reason } => Ok(StageOutcome::Deferred { job, reason }),
        }
    }

    /// 发布策略违规时不创建任务；其他阶段没有额外策略
    fn check_policy(&self, request: &ProviderRequest) -> Result<(), PipelineError> {
        match request {
            ProviderRequest::Publish { target, .. } => {
                check_publish_allowed(target, self.clock.now()).map_err(|e| {
                    info!("发布目标 {} 被策略阻止: {}", target.id, e);
                    e
                })
            }
            _ => Ok(()),
        }
    }

    /// 加载前置产物并确定使用的配置
    async fn prepare(
        &self,
        job_type: JobType,
        source_entity_id: &str,
        payload: &serde_json::Value,
    ) -> PipelineResult<(ProviderConfig, ProviderRequest)> {
        let request = match job_type {
            JobType::ExtractUrls => {
                let website = self
                    .artifacts
                    .find_website(source_entity_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("website", source_entity_id))?;
                ProviderRequest::ExtractUrls { website }
            }
            JobType::ExtractContent => {
                let url = self
                    .artifacts
                    .find_url(source_entity_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("url", source_entity_id))?;
                let selectors = self
                    .artifacts
                    .find_website(&url.website_id)
                    .await?
                    .map(|w| w.selectors)
                    .unwrap_or_else(|| json!({}));
                ProviderRequest::ExtractContent { url, selectors }
            }
            JobType::GenerateContent => {
                let content = self
                    .artifacts
                    .find_content(source_entity_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("content", source_entity_id))?;
                let agent_id = payload_str(payload, "agentId")?;
                let agent = self
                    .artifacts
                    .find_agent(agent_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("agent", agent_id))?;
                let reference_content = payload
                    .get("referenceContent")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                ProviderRequest::GenerateContent {
                    content,
                    agent,
                    reference_content,
                }
            }
            JobType::Publish => {
                let generated = self
                    .artifacts
                    .find_generated(source_entity_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("generated", source_entity_id))?;
                let target_id = payload_str(payload, "targetId")?;
                let target = self
                    .artifacts
                    .find_target(target_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("target", target_id))?;
                ProviderRequest::Publish { generated, target }
            }
            JobType::SyncEngagement => {
                let post = self
                    .artifacts
                    .find_post(source_entity_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("post", source_entity_id))?;
                let target = self
                    .artifacts
                    .find_target(&post.target_id)
                    .await?
                    .ok_or_else(|| PipelineError::artifact_not_found("target", &post.target_id))?;
                ProviderRequest::SyncEngagement { post, target }
            }
        };

        let config = self.resolve_config(&request).await?;
        Ok((config, request))
    }

    /// 发布类请求使用目标绑定的配置，其他请求使用作用域内激活的配置
    async fn resolve_config(&self, request: &ProviderRequest) -> PipelineResult<ProviderConfig> {
        let bound = match request {
            ProviderRequest::Publish { target, .. } | ProviderRequest::SyncEngagement { target, .. } => {
                Some(target.config_id.as_str()).filter(|id| !id.is_empty())
            }
            _ => None,
        };

        match bound {
            Some(config_id) => {
                let config = self.selector.get(config_id).await?;
                if config.scope() != ProviderScope::Publishing {
                    return Err(PipelineError::validation(
                        "configId",
                        format!("配置 {} 不属于发布作用域", config.name),
                    ));
                }
                Ok(config)
            }
            None => {
                let scope = match request {
                    ProviderRequest::ExtractUrls { .. } | ProviderRequest::ExtractContent { .. } => {
                        ProviderScope::Extraction
                    }
                    ProviderRequest::GenerateContent { .. } => ProviderScope::Generation,
                    ProviderRequest::Publish { .. } | ProviderRequest::SyncEngagement { .. } => {
                        ProviderScope::Publishing
                    }
                };
                self.selector.active_for(scope).await
            }
        }
    }

    /// 失败时把错误写到任务上，再把原错误返回给调用方
    async fn abort(&self, job: &PipelineJob, err: PipelineError) -> PipelineError {
        if let Err(e) = self.ledger.fail(&job.id, &err).await {
            error!("记录任务 {} 失败状态时出错: {}", job.id, e);
        }
        err
    }

    async fn execute(
        &self,
        job: PipelineJob,
        config: &ProviderConfig,
        request: ProviderRequest,
    ) -> PipelineResult<StageOutcome> {
        let client = match self.providers.resolve(config.kind) {
            Ok(client) => client,
            Err(e) => return Err(self.abort(&job, e).await),
        };

        let response = match client.call(config, request.clone()).await {
            Ok(response) => response,
            Err(e) => return Err(self.abort(&job, e).await),
        };

        if let Err(e) = self.ledger.report_progress(&job.id, 50).await {
            warn!("上报任务 {} 进度失败: {}", job.id, e);
        }

        let (artifact, result) = match self.store(&job, request, response).await {
            Ok(stored) => stored,
            Err(e) => return Err(self.abort(&job, e).await),
        };

        let job = self.ledger.succeed(&job.id, Some(result)).await?;
        Ok(StageOutcome::Completed { job, artifact })
    }

    /// 写入阶段产物，返回产物和写到任务上的结果摘要
    async fn store(
        &self,
        job: &PipelineJob,
        request: ProviderRequest,
        response: ProviderResponse,
    ) -> PipelineResult<(StageArtifact, serde_json::Value)> {
        let now = self.clock.now();
        match (request, response) {
            (ProviderRequest::ExtractUrls { website }, ProviderResponse::Urls(discovered)) => {
                let total = discovered.len();
                let mut saved = Vec::new();
                for found in discovered {
                    if self
                        .artifacts
                        .find_url_by_address(&website.id, &found.url)
                        .await?
                        .is_some()
                    {
                        continue;
                    }
                    let url = ExtractedUrl {
                        id: Uuid::new_v4().to_string(),
                        website_id: website.id.clone(),
                        url: found.url,
                        title: found.title,
                        produced_by_job_id: job.id.clone(),
                        created_at: now,
                    };
                    saved.push(self.artifacts.save_url(&url).await?);
                }
                info!("站点 {} 新增 {} 个URL (共发现 {})", website.id, saved.len(), total);
                let result = json!({ "postsExtracted": saved.len(), "discovered": total });
                Ok((StageArtifact::Urls(saved), result))
            }
            (
                ProviderRequest::ExtractContent { url, .. },
                ProviderResponse::Content {
                    title,
                    body,
                    images,
                },
            ) => {
                let content = self
                    .artifacts
                    .save_content(&ExtractedContent {
                        id: Uuid::new_v4().to_string(),
                        url_id: url.id,
                        title,
                        body,
                        images,
                        produced_by_job_id: job.id.clone(),
                        created_at: now,
                    })
                    .await?;
                let result = json!({ "contentId": content.id });
                Ok((StageArtifact::Content(content), result))
            }
            (
                ProviderRequest::GenerateContent { content, agent, .. },
                ProviderResponse::Generated { text, metadata },
            ) => {
                let generated = self
                    .artifacts
                    .save_generated(&GeneratedContent {
                        id: Uuid::new_v4().to_string(),
                        content_id: content.id,
                        agent_id: agent.id,
                        text,
                        metadata,
                        produced_by_job_id: job.id.clone(),
                        created_at: now,
                    })
                    .await?;
                let result = json!({
                    "generatedId": generated.id,
                    "metadata": {
                        "processingTime": generated.metadata.processing_time_ms,
                        "tokensUsed": generated.metadata.tokens_used,
                        "cost": generated.metadata.cost,
                    }
                });
                Ok((StageArtifact::Generated(generated), result))
            }
            (
                ProviderRequest::Publish {
                    generated,
                    mut target,
                },
                ProviderResponse::Published { external_post_id },
            ) => {
                let post = self
                    .artifacts
                    .save_post(&PublishedPost {
                        id: Uuid::new_v4().to_string(),
                        generated_id: generated.id,
                        target_id: target.id.clone(),
                        external_post_id,
                        published_at: now,
                        engagement: Engagement::default(),
                        produced_by_job_id: job.id.clone(),
                    })
                    .await?;
                target.policy.record_publish(now);
                target.last_published_at = Some(now);
                self.artifacts.save_target(&target).await?;
                let result = json!({ "postId": post.id, "externalPostId": post.external_post_id });
                Ok((StageArtifact::Post(post), result))
            }
            (
                ProviderRequest::SyncEngagement { mut post, .. },
                ProviderResponse::Engagement {
                    likes,
                    comments,
                    shares,
                },
            ) => {
                post.engagement = Engagement {
                    likes,
                    comments,
                    shares,
                    synced_at: Some(now),
                };
                let post = self.artifacts.save_post(&post).await?;
                let result = json!({ "likes": likes, "comments": comments, "shares": shares });
                Ok((StageArtifact::Post(post), result))
            }
            (request, _) => Err(PipelineError::provider(format!(
                "提供方对 {} 返回了不匹配的响应",
                request.operation()
            ))),
        }
    }

    /// 按优先级认领并执行待处理任务，本轮最多执行 `batch_size` 个
    ///
    /// 前置产物缺失、没有可用配置或发布策略不允许的任务保持待处理，留到下一轮。
    /// 留在队列里的任务不占执行名额，扫描会翻页越过它们；本轮已超额的配置下的任务直接跳过。
    pub async fn drain_pending(&self, batch_size: usize) -> PipelineResult<DrainReport> {
        let page_size = batch_size.max(1);
        let mut report = DrainReport::default();
        let mut exhausted_configs = HashSet::new();
        let mut offset = 0;

        while report.completed + report.failed < batch_size {
            let page = self.ledger.find_pending(offset, page_size).await?;
            let fetched = page.len();
            let mut still_pending = 0;

            for job in page {
                if report.completed + report.failed >= batch_size {
                    break;
                }
                report.examined += 1;
                match self.run_pending(job, &exhausted_configs).await {
                    Ok(Some(StageOutcome::Completed { .. })) => report.completed += 1,
                    Ok(Some(StageOutcome::Deferred { reason, .. })) => {
                        if let PipelineError::QuotaExceeded { config_id, .. } = reason {
                            exhausted_configs.insert(config_id);
                        }
                        report.deferred += 1;
                        still_pending += 1;
                    }
                    Ok(None) => {
                        report.skipped += 1;
                        still_pending += 1;
                    }
                    Err(e) => {
                        debug!("排空时任务执行失败: {}", e);
                        report.failed += 1;
                    }
                }
            }

            if fetched < page_size {
                break;
            }
            offset += still_pending;
        }

        if report.examined > 0 {
            info!(
                "队列排空: 检查 {}, 完成 {}, 推迟 {}, 失败 {}, 跳过 {}",
                report.examined, report.completed, report.deferred, report.failed, report.skipped
            );
        }
        Ok(report)
    }

    async fn run_pending(
        &self,
        job: PipelineJob,
        exhausted_configs: &HashSet<String>,
    ) -> PipelineResult<Option<StageOutcome>> {
        let _target_guard = self
            .lock_target(job.job_type, &job.source_entity_id, &job.payload)
            .await?;

        let (config, request) = match self
            .prepare(job.job_type, &job.source_entity_id, &job.payload)
            .await
        {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("任务 {} 暂时无法执行，保持待处理: {}", job.id, e);
                return Ok(None);
            }
        };

        if exhausted_configs.contains(&config.id) {
            return Ok(None);
        }

        if let Err(reason) = self.check_policy(&request) {
            debug!("任务 {} 暂不满足发布策略: {}", job.id, reason);
            return Ok(None);
        }

        match self.ledger.claim_pending(&job.id, &config.id).await {
            Ok(Admission::Claimed(job)) => self.execute(job, &config, request).await.map(Some),
            Ok(Admission::Deferred { job, reason }) => {
                Ok(Some(StageOutcome::Deferred { job, reason }))
            }
            // 已被其他调用方认领或清除
            Err(PipelineError::InvalidTransition { .. }) | Err(PipelineError::JobNotFound { .. }) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
