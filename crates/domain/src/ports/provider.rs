//! 外部提供方能力接口
//!
//! 每种 `ProviderKind` 一个实现，按配置的 kind 选择，编排层不关心具体协议。

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_core::PipelineResult;
use serde::{Deserialize, Serialize};

use crate::entities::{
    Agent, ExtractedContent, ExtractedUrl, GeneratedContent, GenerationMetadata, ProviderConfig,
    ProviderKind, PublishTarget, PublishedPost, Website,
};

#[derive(Debug, Clone)]
pub enum ProviderRequest {
    ExtractUrls {
        website: Website,
    },
    ExtractContent {
        url: ExtractedUrl,
        selectors: serde_json::Value,
    },
    GenerateContent {
        content: ExtractedContent,
        agent: Agent,
        reference_content: Option<String>,
    },
    Publish {
        generated: GeneratedContent,
        target: PublishTarget,
    },
    SyncEngagement {
        post: PublishedPost,
        target: PublishTarget,
    },
}

impl ProviderRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            ProviderRequest::ExtractUrls { .. } => "extract_urls",
            ProviderRequest::ExtractContent { .. } => "extract_content",
            ProviderRequest::GenerateContent { .. } => "generate_content",
            ProviderRequest::Publish { .. } => "publish",
            ProviderRequest::SyncEngagement { .. } => "sync_engagement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredUrl {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    Urls(Vec<DiscoveredUrl>),
    Content {
        title: String,
        body: String,
        images: Vec<String>,
    },
    Generated {
        text: String,
        metadata: GenerationMetadata,
    },
    Published {
        external_post_id: String,
    },
    Engagement {
        likes: u64,
        comments: u64,
        shares: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOk {
    pub latency_ms: u64,
    pub message: String,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// 执行一次计费的提供方调用，配额由调用方预先扣减
    async fn call(
        &self,
        config: &ProviderConfig,
        request: ProviderRequest,
    ) -> PipelineResult<ProviderResponse>;

    /// 健康探测，不消耗配额
    async fn test_connection(&self, config: &ProviderConfig) -> PipelineResult<ConnectionOk>;
}

/// 按提供方类型查找实现
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, kind: ProviderKind) -> PipelineResult<Arc<dyn ProviderClient>>;
}
