#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pipeline_core::{
    config::{LedgerConfig, ReconcilerConfig},
    Clock, ManualClock, PipelineError, PipelineResult,
};
use pipeline_domain::{
    Agent, ArtifactRepository, ConnectionOk, DiscoveredUrl, ExtractedContent, ExtractedUrl,
    GeneratedContent, GenerationMetadata, ProviderClient, ProviderConfig, ProviderConfigRepository,
    ProviderKind, ProviderRequest, ProviderResolver, ProviderResponse, PublishTarget,
    PublishingPolicy, QuotaLimits, Website,
};
use pipeline_dispatcher::{PipelineDependencies, PipelineServices};
use pipeline_infrastructure::{
    BroadcastEventBus, InMemoryArtifactRepository, InMemoryJobRepository,
    InMemoryProviderConfigRepository,
};
use serde_json::json;

/// 2024-03-15 是周五
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
}

/// 按请求类型返回固定响应的提供方
pub struct FakeProvider {
    kind: ProviderKind,
    calls: AtomicUsize,
    probes: AtomicUsize,
    failure: Mutex<Option<PipelineError>>,
    delay: Mutex<Duration>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn fail_with(&self, error: PipelineError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn call(
        &self,
        _config: &ProviderConfig,
        request: ProviderRequest,
    ) -> PipelineResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        Ok(match request {
            ProviderRequest::ExtractUrls { website } => ProviderResponse::Urls(vec![
                DiscoveredUrl {
                    url: format!("{}/post-1", website.url),
                    title: Some("第一篇".to_string()),
                },
                DiscoveredUrl {
                    url: format!("{}/post-2", website.url),
                    title: None,
                },
            ]),
            ProviderRequest::ExtractContent { url, .. } => ProviderResponse::Content {
                title: format!("标题 {}", url.url),
                body: "正文".to_string(),
                images: vec![],
            },
            ProviderRequest::GenerateContent { content, .. } => ProviderResponse::Generated {
                text: format!("改写: {}", content.title),
                metadata: GenerationMetadata {
                    processing_time_ms: 1200,
                    tokens_used: 800,
                    cost: 0.0016,
                },
            },
            ProviderRequest::Publish { generated, .. } => ProviderResponse::Published {
                external_post_id: format!("fb_{}", generated.id),
            },
            ProviderRequest::SyncEngagement { .. } => ProviderResponse::Engagement {
                likes: 3,
                comments: 1,
                shares: 0,
            },
        })
    }

    async fn test_connection(&self, _config: &ProviderConfig) -> PipelineResult<ConnectionOk> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionOk {
            latency_ms: 1,
            message: "ok".to_string(),
        })
    }
}

pub struct FakeResolver {
    clients: HashMap<ProviderKind, Arc<FakeProvider>>,
}

impl ProviderResolver for FakeResolver {
    fn resolve(&self, kind: ProviderKind) -> PipelineResult<Arc<dyn ProviderClient>> {
        self.clients
            .get(&kind)
            .cloned()
            .map(|c| c as Arc<dyn ProviderClient>)
            .ok_or_else(|| PipelineError::Configuration(format!("未注册 {kind}")))
    }
}

/// 内存仓储、推送通道与假提供方组装起来的完整服务
pub struct Harness {
    pub services: PipelineServices,
    pub clock: Arc<ManualClock>,
    pub bus: Arc<BroadcastEventBus>,
    pub configs: Arc<InMemoryProviderConfigRepository>,
    pub jobs: Arc<InMemoryJobRepository>,
    pub artifacts: Arc<InMemoryArtifactRepository>,
    pub apify: Arc<FakeProvider>,
    pub openai: Arc<FakeProvider>,
    pub facebook: Arc<FakeProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ledger(LedgerConfig::default())
    }

    pub fn with_ledger(ledger: LedgerConfig) -> Self {
        Self::assemble(ledger, |configs| configs as Arc<dyn ProviderConfigRepository>)
    }

    /// 服务层使用包装后的配置仓储，`configs` 字段仍是底层的内存仓储
    pub fn with_config_store(
        wrap: impl FnOnce(Arc<InMemoryProviderConfigRepository>) -> Arc<dyn ProviderConfigRepository>,
    ) -> Self {
        Self::assemble(LedgerConfig::default(), wrap)
    }

    fn assemble(
        ledger: LedgerConfig,
        wrap: impl FnOnce(Arc<InMemoryProviderConfigRepository>) -> Arc<dyn ProviderConfigRepository>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let bus = Arc::new(BroadcastEventBus::new(256));
        let configs = Arc::new(InMemoryProviderConfigRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::new());
        let artifacts = Arc::new(InMemoryArtifactRepository::new());
        let apify = Arc::new(FakeProvider::new(ProviderKind::Apify));
        let openai = Arc::new(FakeProvider::new(ProviderKind::Openai));
        let facebook = Arc::new(FakeProvider::new(ProviderKind::Facebook));

        let resolver = FakeResolver {
            clients: HashMap::from([
                (ProviderKind::Apify, apify.clone()),
                (ProviderKind::Openai, openai.clone()),
                (ProviderKind::Facebook, facebook.clone()),
            ]),
        };

        let reconciler = ReconcilerConfig {
            poll_interval_seconds: 1,
            reconnect_base_delay_ms: 10,
            reconnect_max_delay_ms: 50,
            channel_capacity: 256,
        };

        let services = PipelineServices::new(
            PipelineDependencies {
                configs: wrap(configs.clone()),
                jobs: jobs.clone(),
                artifacts: artifacts.clone(),
                providers: Arc::new(resolver),
                events: bus.clone(),
                channel: bus.clone(),
                clock: clock.clone(),
            },
            ledger,
            reconciler,
        );

        Self {
            services,
            clock,
            bus,
            configs,
            jobs,
            artifacts,
            apify,
            openai,
            facebook,
        }
    }

    /// 直接写入仓储的配置，不经过激活检查
    pub async fn insert_config(&self, kind: ProviderKind, limits: QuotaLimits) -> ProviderConfig {
        let config = ProviderConfig::new(
            format!("{kind}-config"),
            kind,
            "https://api.example.com".to_string(),
            "secret".to_string(),
            limits,
            self.clock.now(),
        );
        self.configs.create(&config).await.unwrap()
    }

    pub async fn active_config(&self, kind: ProviderKind, limits: QuotaLimits) -> ProviderConfig {
        let config = self.insert_config(kind, limits).await;
        self.services.selector.activate(&config.id).await.unwrap()
    }

    /// 三个作用域各激活一个不限量的配置
    pub async fn activate_all(&self) -> (ProviderConfig, ProviderConfig, ProviderConfig) {
        (
            self.active_config(ProviderKind::Apify, QuotaLimits::default()).await,
            self.active_config(ProviderKind::Openai, QuotaLimits::default()).await,
            self.active_config(ProviderKind::Facebook, QuotaLimits::default()).await,
        )
    }

    pub async fn seed_website(&self) -> Website {
        let website = Website::new(
            "示例博客".to_string(),
            "https://blog.example.com".to_string(),
            json!({}),
            self.clock.now(),
        );
        self.artifacts.save_website(&website).await.unwrap()
    }

    pub async fn seed_url(&self) -> ExtractedUrl {
        let website = self.seed_website().await;
        let url = ExtractedUrl {
            id: uuid::Uuid::new_v4().to_string(),
            website_id: website.id,
            url: "https://blog.example.com/post-9".to_string(),
            title: None,
            produced_by_job_id: "seed".to_string(),
            created_at: self.clock.now(),
        };
        self.artifacts.save_url(&url).await.unwrap()
    }

    pub async fn seed_content(&self) -> ExtractedContent {
        let url = self.seed_url().await;
        let content = ExtractedContent {
            id: uuid::Uuid::new_v4().to_string(),
            url_id: url.id,
            title: "原文标题".to_string(),
            body: "原文正文".to_string(),
            images: vec![],
            produced_by_job_id: "seed".to_string(),
            created_at: self.clock.now(),
        };
        self.artifacts.save_content(&content).await.unwrap()
    }

    pub async fn seed_agent(&self) -> Agent {
        let agent = Agent::new(
            "编辑".to_string(),
            "你是一名简洁的编辑".to_string(),
            "gpt-4o-mini".to_string(),
            self.clock.now(),
        );
        self.artifacts.save_agent(&agent).await.unwrap()
    }

    pub async fn seed_generated(&self) -> GeneratedContent {
        let content = self.seed_content().await;
        let agent = self.seed_agent().await;
        let generated = GeneratedContent {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: content.id,
            agent_id: agent.id,
            text: "生成的文本".to_string(),
            metadata: GenerationMetadata::default(),
            produced_by_job_id: "seed".to_string(),
            created_at: self.clock.now(),
        };
        self.artifacts.save_generated(&generated).await.unwrap()
    }

    pub async fn seed_target(&self, config_id: &str, policy: PublishingPolicy) -> PublishTarget {
        let target = PublishTarget::new(
            "主页".to_string(),
            "page-1".to_string(),
            config_id.to_string(),
            policy,
            self.clock.now(),
        );
        self.artifacts.save_target(&target).await.unwrap()
    }
}
