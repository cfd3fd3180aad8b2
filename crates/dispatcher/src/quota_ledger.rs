//! 配额账本
//!
//! 同一个配置的读写在配置级锁内串行执行，窗口滚动在每次读写前惰性完成。

use std::sync::Arc;

use metrics::counter;
use pipeline_core::{
    logging::METRIC_QUOTA_DECISIONS, Clock, PipelineError, PipelineResult, TimeFrame,
};
use pipeline_domain::{
    quota::{most_restrictive, overall_status},
    ProviderConfig, ProviderConfigRepository, QuotaStatus, QuotaWindow,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::keyed_lock::KeyedLocks;

/// 配置的配额快照
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    pub config_id: String,
    pub windows: Vec<QuotaWindow>,
    pub overall_status: QuotaStatus,
    /// 占用最高的窗口
    pub most_restrictive: Option<TimeFrame>,
}

impl QuotaReport {
    fn new(config_id: &str, windows: [QuotaWindow; 3]) -> Self {
        Self {
            config_id: config_id.to_string(),
            overall_status: overall_status(&windows),
            most_restrictive: most_restrictive(&windows).map(|w| w.time_frame),
            windows: windows.to_vec(),
        }
    }
}

pub struct QuotaLedger {
    configs: Arc<dyn ProviderConfigRepository>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<String>,
}

impl QuotaLedger {
    pub fn new(configs: Arc<dyn ProviderConfigRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            configs,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    async fn load(&self, config_id: &str) -> PipelineResult<ProviderConfig> {
        self.configs
            .find_by_id(config_id)
            .await?
            .ok_or_else(|| PipelineError::config_not_found(config_id))
    }

    /// 预检三个窗口，全部通过时三个计数同时加一；任一窗口超限时计数保持不变
    #[instrument(skip(self))]
    pub async fn record_usage(&self, config_id: &str) -> PipelineResult<()> {
        let _guard = self.locks.lock(&config_id.to_string()).await;
        let config = self.load(config_id).await?;
        let now = self.clock.now();

        let mut usage = config.usage.clone();
        let rolled = usage.roll_all(now);

        match usage.admit(&config.quota_limits, now) {
            Ok(()) => {
                self.configs.save_usage(config_id, &usage).await?;
                counter!(METRIC_QUOTA_DECISIONS, "outcome" => "admitted").increment(1);
                debug!(
                    "配额已扣减: hour={}, day={}, month={}",
                    usage.requests_this_hour, usage.requests_today, usage.requests_this_month
                );
                Ok(())
            }
            Err(window) => {
                // 滚动结果仍然落盘，被拒绝的请求本身不计数
                if rolled {
                    self.configs.save_usage(config_id, &usage).await?;
                }
                counter!(METRIC_QUOTA_DECISIONS, "outcome" => "rejected").increment(1);
                warn!("配置 {} 的 {} 窗口配额已用尽", config_id, window);
                Err(PipelineError::QuotaExceeded {
                    config_id: config_id.to_string(),
                    window,
                })
            }
        }
    }

    /// 三个窗口的当前占用，读取前先滚动到期的窗口
    pub async fn get_status(&self, config_id: &str) -> PipelineResult<QuotaReport> {
        let _guard = self.locks.lock(&config_id.to_string()).await;
        let config = self.load(config_id).await?;

        let mut usage = config.usage.clone();
        if usage.roll_all(self.clock.now()) {
            self.configs.save_usage(config_id, &usage).await?;
        }
        Ok(QuotaReport::new(config_id, usage.windows(&config.quota_limits)))
    }

    /// 单独滚动一个窗口，返回是否发生了重置
    pub async fn roll_window(&self, config_id: &str, window: TimeFrame) -> PipelineResult<bool> {
        let _guard = self.locks.lock(&config_id.to_string()).await;
        let config = self.load(config_id).await?;

        let mut usage = config.usage.clone();
        let rolled = usage.roll_window(window, self.clock.now());
        if rolled {
            self.configs.save_usage(config_id, &usage).await?;
            debug!("配置 {} 的 {} 窗口已重置", config_id, window);
        }
        Ok(rolled)
    }
}
