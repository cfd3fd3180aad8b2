use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::{PipelineError, PipelineResult, ProviderScope};
use pipeline_domain::{ProviderConfig, ProviderConfigRepository, UsageCounters};
use tokio::sync::RwLock;
use tracing::debug;

/// 内存提供方配置仓储
#[derive(Debug, Clone, Default)]
pub struct InMemoryProviderConfigRepository {
    configs: Arc<RwLock<HashMap<String, ProviderConfig>>>,
}

impl InMemoryProviderConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProviderConfigRepository for InMemoryProviderConfigRepository {
    async fn create(&self, config: &ProviderConfig) -> PipelineResult<ProviderConfig> {
        let mut configs = self.configs.write().await;
        let mut stored = config.clone();
        // 新建配置一律未激活，激活只能走 activate_exclusive
        stored.is_active = false;
        configs.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: &str) -> PipelineResult<Option<ProviderConfig>> {
        Ok(self.configs.read().await.get(id).cloned())
    }

    async fn find_all(&self) -> PipelineResult<Vec<ProviderConfig>> {
        let mut all: Vec<_> = self.configs.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn find_active(&self, scope: ProviderScope) -> PipelineResult<Option<ProviderConfig>> {
        Ok(self
            .configs
            .read()
            .await
            .values()
            .find(|c| c.is_active && c.scope() == scope)
            .cloned())
    }

    async fn update(&self, config: &ProviderConfig) -> PipelineResult<ProviderConfig> {
        let mut configs = self.configs.write().await;
        let existing = configs
            .get_mut(&config.id)
            .ok_or_else(|| PipelineError::config_not_found(&config.id))?;
        existing.name = config.name.clone();
        existing.base_url = config.base_url.clone();
        existing.api_key = config.api_key.clone();
        existing.quota_limits = config.quota_limits;
        existing.updated_at = config.updated_at;
        Ok(existing.clone())
    }

    async fn save_usage(&self, id: &str, usage: &UsageCounters) -> PipelineResult<()> {
        let mut configs = self.configs.write().await;
        let existing = configs
            .get_mut(id)
            .ok_or_else(|| PipelineError::config_not_found(id))?;
        existing.usage = usage.clone();
        Ok(())
    }

    async fn activate_exclusive(&self, id: &str) -> PipelineResult<ProviderConfig> {
        let mut configs = self.configs.write().await;
        let scope = configs
            .get(id)
            .map(|c| c.scope())
            .ok_or_else(|| PipelineError::config_not_found(id))?;

        let now = Utc::now();
        for config in configs.values_mut().filter(|c| c.scope() == scope) {
            let should_be_active = config.id == id;
            if config.is_active != should_be_active {
                config.is_active = should_be_active;
                config.updated_at = now;
            }
        }
        debug!("作用域 {} 的激活配置切换为 {}", scope, id);

        configs
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::config_not_found(id))
    }

    async fn delete(&self, id: &str) -> PipelineResult<bool> {
        Ok(self.configs.write().await.remove(id).is_some())
    }
}
