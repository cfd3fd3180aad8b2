//! 事件对账器
//!
//! 把至多一次投递的推送事件合并到本地视图中，并在每次（重新）连接后
//! 轮询任务账本校正。本地视图只做展示，任务账本的认领结果始终优先。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use pipeline_core::{
    config::ReconcilerConfig,
    logging::{METRIC_RECONCILER_RECONNECTS, METRIC_RECONCILER_STALE_EVENTS},
    JobStatus, PipelineResult,
};
use pipeline_domain::{
    Delivery, EventChannel, EventPhase, JobFilter, JobKey, PageRequest, PipelineEvent, PipelineJob,
};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::job_ledger::JobLedger;

/// 退避抖动幅度
const JITTER_FACTOR: f64 = 0.1;
/// 对账时单页拉取的任务数
const RECONCILE_PAGE_SIZE: u32 = 200;

/// 本地视图中一个键的状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalJobState {
    pub job_id: String,
    pub status: JobStatus,
    pub version: u64,
    pub progress: u8,
    pub updated_at: DateTime<Utc>,
}

impl LocalJobState {
    fn from_job(job: &PipelineJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            version: job.version,
            progress: job.progress,
            updated_at: job.updated_at,
        }
    }
}

/// 应用一个事件的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// 过期或重复的事件，被丢弃
    Stale,
}

pub struct EventReconciler {
    channel: Arc<dyn EventChannel>,
    ledger: Arc<JobLedger>,
    config: ReconcilerConfig,
    state: RwLock<HashMap<JobKey, LocalJobState>>,
    in_flight: RwLock<HashSet<JobKey>>,
}

impl EventReconciler {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        ledger: Arc<JobLedger>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            channel,
            ledger,
            config,
            state: RwLock::new(HashMap::new()),
            in_flight: RwLock::new(HashSet::new()),
        }
    }

    /// 幂等地应用一个事件
    ///
    /// 同一个任务只接受版本更高的事件；同一个键上出现另一个任务时，
    /// 只有时间不早于当前记录的事件才会替换它。
    pub async fn apply(&self, event: &PipelineEvent) -> ApplyOutcome {
        let key = event.key();
        let mut state = self.state.write().await;

        if let Some(current) = state.get(&key) {
            let stale = if current.job_id == event.job_id {
                event.version <= current.version
            } else {
                event.timestamp < current.updated_at
            };
            if stale {
                counter!(METRIC_RECONCILER_STALE_EVENTS).increment(1);
                debug!("丢弃过期事件 {} (version={})", event.name(), event.version);
                return ApplyOutcome::Stale;
            }
        }

        let status = event.phase.job_status();
        let previous_progress = state
            .get(&key)
            .filter(|s| s.job_id == event.job_id)
            .map(|s| s.progress)
            .unwrap_or(0);
        let progress = match event.phase {
            EventPhase::Completed => 100,
            EventPhase::Started => 0,
            _ => event.percentage.unwrap_or(previous_progress),
        };

        state.insert(
            key.clone(),
            LocalJobState {
                job_id: event.job_id.clone(),
                status,
                version: event.version,
                progress,
                updated_at: event.timestamp,
            },
        );
        drop(state);

        let mut in_flight = self.in_flight.write().await;
        if status == JobStatus::Processing {
            in_flight.insert(key);
        } else {
            in_flight.remove(&key);
        }
        ApplyOutcome::Applied
    }

    /// 以任务账本为准校正本地视图，返回校正的键数量
    pub async fn reconcile(&self) -> PipelineResult<usize> {
        let mut authoritative: HashMap<JobKey, PipelineJob> = HashMap::new();

        // 账本中所有处理中的任务
        let filter = JobFilter {
            job_type: None,
            status: Some(JobStatus::Processing),
        };
        let mut page_no = 1;
        loop {
            let page = self
                .ledger
                .list(&filter, PageRequest::new(page_no, RECONCILE_PAGE_SIZE))
                .await?;
            let fetched = page.items.len();
            for job in page.items {
                authoritative.insert(job.key(), job);
            }
            if fetched < RECONCILE_PAGE_SIZE as usize {
                break;
            }
            page_no += 1;
        }

        // 本地视图中已知但不再处理中的键；已与账本一致的终态记录不再跟踪
        let known: Vec<(JobKey, LocalJobState)> = self
            .state
            .read()
            .await
            .iter()
            .map(|(key, local)| (key.clone(), local.clone()))
            .collect();
        let mut settled = 0;
        for (key, local) in known {
            if authoritative.contains_key(&key) {
                continue;
            }
            if let Some(job) = self
                .ledger
                .latest_for_key(key.job_type, &key.source_entity_id)
                .await?
            {
                if job.status.is_terminal()
                    && local.job_id == job.id
                    && local.status == job.status
                    && local.version == job.version
                {
                    settled += 1;
                    continue;
                }
                authoritative.insert(key, job);
            }
        }

        let mut state = self.state.write().await;
        let mut in_flight = self.in_flight.write().await;
        in_flight.clear();
        for (key, job) in &authoritative {
            if job.is_processing() {
                in_flight.insert(key.clone());
            }
            state.insert(key.clone(), LocalJobState::from_job(job));
        }
        // 账本中已不存在的键（例如被清空的待处理任务）
        state.retain(|key, _| authoritative.contains_key(key));

        debug!(
            "对账完成，校正 {} 个键，移除 {} 个已结束的键",
            authoritative.len(),
            settled
        );
        Ok(authoritative.len())
    }

    pub async fn local_state(&self, key: &JobKey) -> Option<LocalJobState> {
        self.state.read().await.get(key).cloned()
    }

    /// 仅供参考的处理中集合，是否允许执行由账本的认领决定
    pub async fn is_in_flight(&self, key: &JobKey) -> bool {
        self.in_flight.read().await.contains(key)
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.read().await.len()
    }

    pub async fn tracked_count(&self) -> usize {
        self.state.read().await.len()
    }

    /// 第 `attempt` 次重连前的等待时间，指数退避并加入随机抖动
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms as f64;
        let max = self.config.reconnect_max_delay_ms as f64;
        let exponential = base * 2f64.powi(attempt.min(30) as i32);
        let capped = exponential.min(max);
        let jitter = capped * JITTER_FACTOR * (rand::random::<f64>() - 0.5) * 2.0;
        Duration::from_millis((capped + jitter).clamp(base.min(max), max) as u64)
    }

    /// 运行直到收到停止信号，停止时清空本地视图
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut attempt: u32 = 0;
        let mut poll = tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds.max(1)));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 首个tick立即完成，连接时已经对账过
        poll.tick().await;

        info!("事件对账器已启动");
        loop {
            let mut subscription = self.channel.subscribe();
            if let Err(e) = self.reconcile().await {
                warn!("连接后对账失败: {}", e);
            }

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        self.shutdown().await;
                        return;
                    }
                    delivery = subscription.next() => match delivery {
                        Delivery::Event(event) => {
                            attempt = 0;
                            self.apply(&event).await;
                        }
                        Delivery::Lagged(missed) => {
                            // 丢失了事件，按重连处理：立即以账本为准对账
                            warn!("对账器落后，丢失 {} 个事件", missed);
                            counter!(METRIC_RECONCILER_RECONNECTS).increment(1);
                            if let Err(e) = self.reconcile().await {
                                warn!("落后后对账失败: {}", e);
                            }
                        }
                        Delivery::Closed => break,
                    },
                    _ = poll.tick() => {
                        if let Err(e) = self.reconcile().await {
                            warn!("定期对账失败: {}", e);
                        }
                    }
                }
            }

            counter!(METRIC_RECONCILER_RECONNECTS).increment(1);
            let delay = self.backoff_delay(attempt);
            attempt = attempt.saturating_add(1);
            warn!("推送通道已关闭，{}ms 后重连", delay.as_millis());
            tokio::select! {
                _ = shutdown.recv() => {
                    self.shutdown().await;
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    pub async fn shutdown(&self) {
        self.state.write().await.clear();
        self.in_flight.write().await.clear();
        info!("事件对账器已停止");
    }
}
