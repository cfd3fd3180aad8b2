//! 任务账本
//!
//! 阶段状态的唯一权威来源。同一个 `(job_type, source_entity_id)` 上的
//! 准入与状态转换在键级锁内串行执行，不同键之间完全并发。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use metrics::counter;
use pipeline_core::{
    config::LedgerConfig, logging::METRIC_JOB_TRANSITIONS, Clock, JobStatus, JobType,
    PipelineError, PipelineResult,
};
use pipeline_domain::{
    EventPhase, EventPublisher, JobFilter, JobKey, JobRepository, NewJob, Page, PageRequest,
    PipelineEvent, PipelineJob,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::keyed_lock::KeyedLocks;
use crate::quota_ledger::QuotaLedger;

/// 请求执行某个阶段
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub job_type: JobType,
    pub source_entity_id: String,
    pub related_config_id: String,
    pub payload: serde_json::Value,
    pub priority: Option<i32>,
}

/// 准入结果
#[derive(Debug, Clone)]
pub enum Admission {
    /// 任务已进入处理中，调用方负责执行并上报结果
    Claimed(PipelineJob),
    /// 准入控制拒绝，`job` 为待处理或正在处理的那个任务
    Deferred {
        job: Option<PipelineJob>,
        reason: PipelineError,
    },
}

/// 某类任务的待处理数量
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepth {
    pub job_type: JobType,
    pub stage: &'static str,
    pub pending: u64,
}

pub struct JobLedger {
    jobs: Arc<dyn JobRepository>,
    quota: Arc<QuotaLedger>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<JobKey>,
    defaults: LedgerConfig,
}

impl JobLedger {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        quota: Arc<QuotaLedger>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        defaults: LedgerConfig,
    ) -> Self {
        Self {
            jobs,
            quota,
            events,
            clock,
            locks: KeyedLocks::new(),
            defaults,
        }
    }

    async fn load(&self, job_id: &str) -> PipelineResult<PipelineJob> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| PipelineError::job_not_found(job_id))
    }

    fn emit(&self, job: &PipelineJob, phase: EventPhase) {
        self.events
            .publish(PipelineEvent::from_job(job, phase, self.clock.now()));
    }

    fn emit_failure(&self, job: &PipelineJob, reason: &PipelineError) {
        let event = PipelineEvent::from_job(job, EventPhase::Failed, self.clock.now())
            .with_reason(reason.code());
        self.events.publish(event);
    }

    fn record_transition(job: &PipelineJob, transition: &'static str) {
        counter!(
            METRIC_JOB_TRANSITIONS,
            "job_type" => job.job_type.as_str(),
            "transition" => transition
        )
        .increment(1);
    }

    /// 为某个键申请执行
    ///
    /// 已有处理中的任务时返回 `DuplicateGeneration`；已有待处理任务时复用它而不新建；
    /// 配额不足时任务保持待处理并返回 `QuotaExceeded`。
    #[instrument(skip(self, request), fields(job_type = %request.job_type, source = %request.source_entity_id))]
    pub async fn dispatch(&self, request: DispatchRequest) -> PipelineResult<Admission> {
        let key = JobKey::new(request.job_type, request.source_entity_id.clone());
        let _guard = self.locks.lock(&key).await;

        let existing = self
            .jobs
            .find_by_key(request.job_type, &request.source_entity_id)
            .await?;

        if let Some(running) = existing.iter().find(|j| j.is_processing()) {
            debug!("键 {} 已有处理中的任务 {}", key, running.id);
            return Ok(Admission::Deferred {
                reason: PipelineError::DuplicateGeneration {
                    job_type: request.job_type,
                    source_entity_id: request.source_entity_id,
                },
                job: Some(running.clone()),
            });
        }

        let job = match existing.into_iter().find(|j| j.is_pending()) {
            Some(mut pending) => {
                // 复用待处理任务，参数以最新请求为准
                pending.related_config_id = request.related_config_id;
                pending.payload = request.payload;
                pending.updated_at = self.clock.now();
                debug!("复用待处理任务 {}", pending.id);
                self.jobs.update(&pending).await?
            }
            None => {
                let job = PipelineJob::new(
                    NewJob {
                        job_type: request.job_type,
                        source_entity_id: request.source_entity_id,
                        related_config_id: request.related_config_id,
                        priority: request.priority.unwrap_or(self.defaults.default_priority),
                        max_retries: self.defaults.default_max_retries,
                        payload: request.payload,
                    },
                    self.clock.now(),
                );
                Self::record_transition(&job, "create");
                self.jobs.create(&job).await?
            }
        };

        self.admit_and_claim(job).await
    }

    /// 认领一个已有的待处理任务，由队列排空循环使用
    ///
    /// `config_id` 为当前应使用的配置，会覆盖任务上记录的配置。
    pub async fn claim_pending(&self, job_id: &str, config_id: &str) -> PipelineResult<Admission> {
        let key = self.load(job_id).await?.key();
        let _guard = self.locks.lock(&key).await;

        let mut job = self.load(job_id).await?;
        if !job.is_pending() {
            return Err(PipelineError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.status.to_string(),
                action: "claim".to_string(),
            });
        }

        let siblings = self.jobs.find_by_key(job.job_type, &job.source_entity_id).await?;
        if let Some(running) = siblings.into_iter().find(|j| j.is_processing()) {
            return Ok(Admission::Deferred {
                reason: PipelineError::DuplicateGeneration {
                    job_type: job.job_type,
                    source_entity_id: job.source_entity_id.clone(),
                },
                job: Some(running),
            });
        }

        if job.related_config_id != config_id {
            job.related_config_id = config_id.to_string();
            job = self.jobs.update(&job).await?;
        }
        self.admit_and_claim(job).await
    }

    /// 调用方必须已持有该任务键的锁
    async fn admit_and_claim(&self, mut job: PipelineJob) -> PipelineResult<Admission> {
        match self.quota.record_usage(&job.related_config_id).await {
            Ok(()) => {}
            Err(reason @ PipelineError::QuotaExceeded { .. }) => {
                info!("任务 {} 因配额不足保持待处理", job.id);
                return Ok(Admission::Deferred {
                    job: Some(job),
                    reason,
                });
            }
            Err(e) => return Err(e),
        }

        job.claim(self.clock.now())?;
        let job = self.jobs.update(&job).await?;
        Self::record_transition(&job, "claim");
        self.emit(&job, EventPhase::Started);
        info!("任务 {} 开始处理: {}", job.id, job.key());
        Ok(Admission::Claimed(job))
    }

    /// 上报进度，进度只能单调不减；未变化时不产生事件
    pub async fn report_progress(&self, job_id: &str, progress: u8) -> PipelineResult<PipelineJob> {
        let key = self.load(job_id).await?.key();
        let _guard = self.locks.lock(&key).await;

        let mut job = self.load(job_id).await?;
        let before = job.version;
        job.update_progress(progress, self.clock.now())?;
        if job.version == before {
            return Ok(job);
        }
        let job = self.jobs.update(&job).await?;
        self.emit(&job, EventPhase::Progress);
        Ok(job)
    }

    pub async fn succeed(
        &self,
        job_id: &str,
        result: Option<serde_json::Value>,
    ) -> PipelineResult<PipelineJob> {
        let key = self.load(job_id).await?.key();
        let _guard = self.locks.lock(&key).await;

        let mut job = self.load(job_id).await?;
        job.succeed(result, self.clock.now())?;
        let job = self.jobs.update(&job).await?;
        Self::record_transition(&job, "succeed");
        self.emit(&job, EventPhase::Completed);
        info!("任务 {} 已完成", job.id);
        Ok(job)
    }

    /// 记录失败原因，重试次数不变
    pub async fn fail(&self, job_id: &str, error: &PipelineError) -> PipelineResult<PipelineJob> {
        let key = self.load(job_id).await?.key();
        let _guard = self.locks.lock(&key).await;

        let mut job = self.load(job_id).await?;
        job.fail(error.to_string(), self.clock.now())?;
        let job = self.jobs.update(&job).await?;
        Self::record_transition(&job, "fail");
        self.emit_failure(&job, error);
        warn!("任务 {} 失败: {}", job.id, error);
        Ok(job)
    }

    /// 失败任务重新排队；达到重试上限时返回 `RetryExhausted`，任务不变
    pub async fn retry(&self, job_id: &str) -> PipelineResult<PipelineJob> {
        let key = self.load(job_id).await?.key();
        let _guard = self.locks.lock(&key).await;

        let mut job = self.load(job_id).await?;
        job.retry(self.clock.now())?;
        let job = self.jobs.update(&job).await?;
        Self::record_transition(&job, "retry");
        info!(
            "任务 {} 已重新排队 ({}/{})",
            job.id, job.retry_count, job.max_retries
        );
        Ok(job)
    }

    /// 删除某类型的全部待处理任务，处理中的任务不受影响，重复调用是空操作
    ///
    /// 逐个持有任务键的锁再删除，正在认领中的任务会等认领结束后因已不是待处理而保留。
    pub async fn clear_queue(&self, job_type: JobType) -> PipelineResult<u64> {
        let mut removed = 0;
        for job in self.jobs.find_pending_by_type(job_type).await? {
            let _guard = self.locks.lock(&job.key()).await;
            if self.jobs.delete_if_pending(&job.id).await? {
                removed += 1;
            }
        }
        info!("已清空 {} 队列中的 {} 个待处理任务", job_type, removed);
        Ok(removed)
    }

    /// 每种任务类型的待处理数量，没有任务的类型也会列出
    pub async fn queue_health(&self) -> PipelineResult<Vec<QueueDepth>> {
        let counts = self.jobs.count_pending_by_type().await?;
        Ok(JobType::ALL
            .into_iter()
            .map(|job_type| QueueDepth {
                job_type,
                stage: job_type.stage(),
                pending: counts.get(&job_type).copied().unwrap_or(0),
            })
            .collect())
    }

    pub async fn status_counts(&self) -> PipelineResult<BTreeMap<String, u64>> {
        let counts: HashMap<JobStatus, u64> = self.jobs.count_by_status().await?;
        Ok([
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ]
        .into_iter()
        .map(|s| (s.as_str().to_string(), counts.get(&s).copied().unwrap_or(0)))
        .collect())
    }

    pub async fn get(&self, job_id: &str) -> PipelineResult<PipelineJob> {
        self.load(job_id).await
    }

    pub async fn list(&self, filter: &JobFilter, page: PageRequest) -> PipelineResult<Page<PipelineJob>> {
        self.jobs.list(filter, page).await
    }

    pub async fn find_pending(&self, offset: usize, limit: usize) -> PipelineResult<Vec<PipelineJob>> {
        self.jobs.find_pending(offset, limit).await
    }

    /// 某个键下最新创建的任务，用于派生产物状态
    pub async fn latest_for_key(
        &self,
        job_type: JobType,
        source_entity_id: &str,
    ) -> PipelineResult<Option<PipelineJob>> {
        Ok(self
            .jobs
            .find_by_key(job_type, source_entity_id)
            .await?
            .into_iter()
            .last())
    }
}
