#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use pipeline_api::create_app;
use pipeline_core::{
    config::{ApiConfig, LedgerConfig, ReconcilerConfig},
    ManualClock, PipelineError, PipelineResult,
};
use pipeline_domain::{
    ConnectionOk, DiscoveredUrl, GenerationMetadata, ProviderClient, ProviderConfig, ProviderKind,
    ProviderRequest, ProviderResolver, ProviderResponse,
};
use pipeline_dispatcher::{PipelineDependencies, PipelineServices};
use pipeline_infrastructure::{
    BroadcastEventBus, InMemoryArtifactRepository, InMemoryJobRepository,
    InMemoryProviderConfigRepository,
};
use serde_json::Value;
use tower::ServiceExt;

/// 返回固定响应的提供方，可切换为失败
pub struct StubProvider {
    kind: ProviderKind,
    failing: AtomicBool,
}

impl StubProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn call(
        &self,
        _config: &ProviderConfig,
        request: ProviderRequest,
    ) -> PipelineResult<ProviderResponse> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::provider("HTTP 500: upstream unavailable"));
        }
        Ok(match request {
            ProviderRequest::ExtractUrls { website } => {
                ProviderResponse::Urls(vec![DiscoveredUrl {
                    url: format!("{}/article", website.url),
                    title: Some("文章".to_string()),
                }])
            }
            ProviderRequest::ExtractContent { .. } => ProviderResponse::Content {
                title: "原文".to_string(),
                body: "正文".to_string(),
                images: vec![],
            },
            ProviderRequest::GenerateContent { .. } => ProviderResponse::Generated {
                text: "改写后的文本".to_string(),
                metadata: GenerationMetadata {
                    processing_time_ms: 900,
                    tokens_used: 500,
                    cost: 0.001,
                },
            },
            ProviderRequest::Publish { generated, .. } => ProviderResponse::Published {
                external_post_id: format!("fb_{}", generated.id),
            },
            ProviderRequest::SyncEngagement { .. } => ProviderResponse::Engagement {
                likes: 10,
                comments: 2,
                shares: 1,
            },
        })
    }

    async fn test_connection(&self, _config: &ProviderConfig) -> PipelineResult<ConnectionOk> {
        Ok(ConnectionOk {
            latency_ms: 3,
            message: "ok".to_string(),
        })
    }
}

struct StubResolver {
    clients: HashMap<ProviderKind, Arc<StubProvider>>,
}

impl ProviderResolver for StubResolver {
    fn resolve(&self, kind: ProviderKind) -> PipelineResult<Arc<dyn ProviderClient>> {
        self.clients
            .get(&kind)
            .cloned()
            .map(|c| c as Arc<dyn ProviderClient>)
            .ok_or_else(|| PipelineError::Configuration(format!("未注册 {kind}")))
    }
}

pub struct TestApp {
    pub router: Router,
    pub services: Arc<PipelineServices>,
    pub clock: Arc<ManualClock>,
    pub bus: Arc<BroadcastEventBus>,
    pub openai: Arc<StubProvider>,
}

impl TestApp {
    pub fn new() -> Self {
        // 周五上午，发布时段内
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap(),
        ));
        let bus = Arc::new(BroadcastEventBus::new(256));
        let apify = Arc::new(StubProvider::new(ProviderKind::Apify));
        let openai = Arc::new(StubProvider::new(ProviderKind::Openai));
        let facebook = Arc::new(StubProvider::new(ProviderKind::Facebook));
        let resolver = StubResolver {
            clients: HashMap::from([
                (ProviderKind::Apify, apify),
                (ProviderKind::Openai, openai.clone()),
                (ProviderKind::Facebook, facebook),
            ]),
        };

        let services = Arc::new(PipelineServices::new(
            PipelineDependencies {
                configs: Arc::new(InMemoryProviderConfigRepository::new()),
                jobs: Arc::new(InMemoryJobRepository::new()),
                artifacts: Arc::new(InMemoryArtifactRepository::new()),
                providers: Arc::new(resolver),
                events: bus.clone(),
                channel: bus.clone(),
                clock: clock.clone(),
            },
            LedgerConfig {
                autostart: false,
                ..LedgerConfig::default()
            },
            ReconcilerConfig::default(),
        ));

        let router = create_app(services.clone(), &ApiConfig::default());

        Self {
            router,
            services,
            clock,
            bus,
            openai,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        // 提取器拒绝时响应体是纯文本
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::POST, uri, None).await
    }

    /// 通过接口创建并激活配置，返回配置ID
    pub async fn activated_config(&self, kind: &str, limits: Value) -> String {
        let (status, body) = self
            .post(
                "/configs",
                serde_json::json!({
                    "name": format!("{kind}-main"),
                    "kind": kind,
                    "baseUrl": "https://api.example.com",
                    "apiKey": "secret",
                    "quotaLimits": limits,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = self
            .post_empty(&format!("/configs/{id}/activate"))
            .await;
        assert_eq!(status, StatusCode::OK);
        id
    }
}
