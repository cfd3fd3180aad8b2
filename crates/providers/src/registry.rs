use std::collections::HashMap;
use std::sync::Arc;

use pipeline_core::{config::ProvidersConfig, PipelineError, PipelineResult};
use pipeline_domain::{ProviderClient, ProviderKind, ProviderResolver};
use tracing::info;

use crate::{ApifyClient, FacebookClient, HttpTransport, OpenAiClient};

/// 按提供方类型注册的客户端表
#[derive(Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置提供方，共用一个HTTP传输层
    pub fn with_defaults(config: &ProvidersConfig) -> PipelineResult<Self> {
        let transport = HttpTransport::new(config)?;
        let mut registry = Self::new();
        registry.register(Arc::new(ApifyClient::new(transport.clone())));
        registry.register(Arc::new(OpenAiClient::new(transport.clone())));
        registry.register(Arc::new(FacebookClient::new(transport)));
        info!("已注册 {} 个提供方客户端", registry.clients.len());
        Ok(registry)
    }

    /// 同类型重复注册时替换旧的实现
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.kind(), client);
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.clients.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl ProviderResolver for ProviderRegistry {
    fn resolve(&self, kind: ProviderKind) -> PipelineResult<Arc<dyn ProviderClient>> {
        self.clients
            .get(&kind)
            .cloned()
            .ok_or_else(|| PipelineError::config_error(format!("未注册的提供方类型: {kind}")))
    }
}
