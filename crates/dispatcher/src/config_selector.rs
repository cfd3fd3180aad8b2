use std::sync::Arc;

use pipeline_core::{Clock, PipelineError, PipelineResult, ProviderScope};
use pipeline_domain::{
    ConnectionOk, ProviderConfig, ProviderConfigRepository, ProviderKind, ProviderResolver,
    QuotaLimits, QuotaStatus,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::keyed_lock::KeyedLocks;
use crate::quota_ledger::QuotaLedger;

/// 新建配置的管理员输入
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConfigRequest {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub quota_limits: QuotaLimits,
}

/// 配置的部分更新，未给出的字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub quota_limits: Option<QuotaLimits>,
}

/// 提供方配置管理与激活
pub struct ConfigSelector {
    configs: Arc<dyn ProviderConfigRepository>,
    quota: Arc<QuotaLedger>,
    providers: Arc<dyn ProviderResolver>,
    clock: Arc<dyn Clock>,
    scope_locks: KeyedLocks<ProviderScope>,
}

impl ConfigSelector {
    pub fn new(
        configs: Arc<dyn ProviderConfigRepository>,
        quota: Arc<QuotaLedger>,
        providers: Arc<dyn ProviderResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            configs,
            quota,
            providers,
            clock,
            scope_locks: KeyedLocks::new(),
        }
    }

    pub async fn get(&self, config_id: &str) -> PipelineResult<ProviderConfig> {
        self.configs
            .find_by_id(config_id)
            .await?
            .ok_or_else(|| PipelineError::config_not_found(config_id))
    }

    pub async fn list(&self) -> PipelineResult<Vec<ProviderConfig>> {
        self.configs.find_all().await
    }

    /// 新配置总是未激活状态
    pub async fn create(&self, request: CreateConfigRequest) -> PipelineResult<ProviderConfig> {
        let config = ProviderConfig::new(
            request.name,
            request.kind,
            request.base_url,
            request.api_key,
            request.quota_limits,
            self.clock.now(),
        );
        config.validate()?;
        let created = self.configs.create(&config).await?;
        info!("已创建提供方配置: {} ({})", created.name, created.kind);
        Ok(created)
    }

    pub async fn update(
        &self,
        config_id: &str,
        request: UpdateConfigRequest,
    ) -> PipelineResult<ProviderConfig> {
        let mut config = self.get(config_id).await?;
        if let Some(name) = request.name {
            config.name = name;
        }
        if let Some(base_url) = request.base_url {
            config.base_url = base_url;
        }
        if let Some(api_key) = request.api_key {
            config.api_key = api_key;
        }
        if let Some(limits) = request.quota_limits {
            config.quota_limits = limits;
        }
        config.updated_at = self.clock.now();
        config.validate()?;
        self.configs.update(&config).await
    }

    pub async fn delete(&self, config_id: &str) -> PipelineResult<()> {
        if !self.configs.delete(config_id).await? {
            return Err(PipelineError::config_not_found(config_id));
        }
        info!("已删除提供方配置 {}", config_id);
        Ok(())
    }

    /// 激活配置并停用同作用域的其他配置；目标配置处于临界状态时拒绝且不产生任何变化
    #[instrument(skip(self))]
    pub async fn activate(&self, config_id: &str) -> PipelineResult<ProviderConfig> {
        let config = self.get(config_id).await?;
        let _guard = self.scope_locks.lock(&config.scope()).await;

        let report = self.quota.get_status(config_id).await?;
        if report.overall_status == QuotaStatus::Critical {
            warn!("配置 {} 配额处于临界状态，拒绝激活", config_id);
            return Err(PipelineError::ConfigExhausted {
                config_id: config_id.to_string(),
            });
        }

        let activated = self.configs.activate_exclusive(config_id).await?;
        info!("已激活 {} 作用域的配置: {}", activated.scope(), activated.name);
        Ok(activated)
    }

    /// 通过提供方实现做一次健康探测，不消耗配额
    pub async fn test_connection(&self, config_id: &str) -> PipelineResult<ConnectionOk> {
        let config = self.get(config_id).await?;
        let client = self.providers.resolve(config.kind)?;
        client.test_connection(&config).await
    }

    /// 某个作用域当前激活的配置
    pub async fn active_for(&self, scope: ProviderScope) -> PipelineResult<ProviderConfig> {
        self.configs
            .find_active(scope)
            .await?
            .ok_or(PipelineError::NoActiveConfig { scope })
    }

    pub async fn find_active(&self, scope: ProviderScope) -> PipelineResult<Option<ProviderConfig>> {
        self.configs.find_active(scope).await
    }
}
