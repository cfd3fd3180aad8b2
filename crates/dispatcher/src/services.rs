//! 调度层组装
//!
//! 把仓储、提供方与推送通道组装成一组共享的服务，供API与后台循环使用。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pipeline_core::{
    config::{LedgerConfig, ReconcilerConfig},
    Clock, PipelineResult, ProviderScope,
};
use pipeline_domain::{
    ArtifactCounts, ArtifactRepository, EventChannel, EventPublisher, JobRepository,
    ProviderConfigRepository, ProviderResolver,
};
use serde::Serialize;

use crate::catalog::ArtifactCatalog;
use crate::config_selector::ConfigSelector;
use crate::drain::DrainController;
use crate::job_ledger::{JobLedger, QueueDepth};
use crate::orchestrator::StageOrchestrator;
use crate::quota_ledger::{QuotaLedger, QuotaReport};
use crate::reconciler::EventReconciler;

/// 组装服务所需的外部依赖
pub struct PipelineDependencies {
    pub configs: Arc<dyn ProviderConfigRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub providers: Arc<dyn ProviderResolver>,
    /// 同一个推送通道的发布端与订阅端
    pub events: Arc<dyn EventPublisher>,
    pub channel: Arc<dyn EventChannel>,
    pub clock: Arc<dyn Clock>,
}

/// 每个作用域激活配置的配额概况
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeQuota {
    pub scope: ProviderScope,
    pub config_id: Option<String>,
    pub config_name: Option<String>,
    pub quota: Option<QuotaReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub drain_running: bool,
    pub queues: Vec<QueueDepth>,
    pub jobs: BTreeMap<String, u64>,
    pub in_flight: usize,
    pub tracked_keys: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub artifacts: ArtifactCounts,
    pub jobs: BTreeMap<String, u64>,
    pub queues: Vec<QueueDepth>,
    pub quotas: Vec<ScopeQuota>,
}

pub struct PipelineServices {
    pub quota: Arc<QuotaLedger>,
    pub selector: Arc<ConfigSelector>,
    pub ledger: Arc<JobLedger>,
    pub orchestrator: Arc<StageOrchestrator>,
    pub catalog: Arc<ArtifactCatalog>,
    pub reconciler: Arc<EventReconciler>,
    pub drain: Arc<DrainController>,
    pub channel: Arc<dyn EventChannel>,
}

impl PipelineServices {
    pub fn new(
        deps: PipelineDependencies,
        ledger_config: LedgerConfig,
        reconciler_config: ReconcilerConfig,
    ) -> Self {
        let quota = Arc::new(QuotaLedger::new(deps.configs.clone(), deps.clock.clone()));
        let selector = Arc::new(ConfigSelector::new(
            deps.configs,
            quota.clone(),
            deps.providers.clone(),
            deps.clock.clone(),
        ));
        let drain_interval = Duration::from_secs(ledger_config.drain_interval_seconds);
        let drain_batch = ledger_config.drain_batch_size;
        let ledger = Arc::new(JobLedger::new(
            deps.jobs,
            quota.clone(),
            deps.events,
            deps.clock.clone(),
            ledger_config,
        ));
        let orchestrator = Arc::new(StageOrchestrator::new(
            ledger.clone(),
            selector.clone(),
            deps.artifacts.clone(),
            deps.providers,
            deps.clock.clone(),
        ));
        let catalog = Arc::new(ArtifactCatalog::new(
            deps.artifacts,
            ledger.clone(),
            deps.clock,
        ));
        let reconciler = Arc::new(EventReconciler::new(
            deps.channel.clone(),
            ledger.clone(),
            reconciler_config,
        ));
        let drain = Arc::new(DrainController::new(
            orchestrator.clone(),
            drain_interval,
            drain_batch,
        ));

        Self {
            quota,
            selector,
            ledger,
            orchestrator,
            catalog,
            reconciler,
            drain,
            channel: deps.channel,
        }
    }

    pub async fn status(&self) -> PipelineResult<SystemStatus> {
        Ok(SystemStatus {
            drain_running: self.drain.is_running(),
            queues: self.ledger.queue_health().await?,
            jobs: self.ledger.status_counts().await?,
            in_flight: self.reconciler.in_flight_count().await,
            tracked_keys: self.reconciler.tracked_count().await,
        })
    }

    pub async fn dashboard_stats(&self) -> PipelineResult<DashboardStats> {
        let mut quotas = Vec::new();
        for scope in [
            ProviderScope::Extraction,
            ProviderScope::Generation,
            ProviderScope::Publishing,
        ] {
            let summary = match self.selector.find_active(scope).await? {
                Some(config) => ScopeQuota {
                    scope,
                    quota: Some(self.quota.get_status(&config.id).await?),
                    config_id: Some(config.id),
                    config_name: Some(config.name),
                },
                None => ScopeQuota {
                    scope,
                    config_id: None,
                    config_name: None,
                    quota: None,
                },
            };
            quotas.push(summary);
        }

        Ok(DashboardStats {
            artifacts: self.catalog.counts().await?,
            jobs: self.ledger.status_counts().await?,
            queues: self.ledger.queue_health().await?,
            quotas,
        })
    }
}
