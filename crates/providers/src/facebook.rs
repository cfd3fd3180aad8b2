//! Facebook Graph API客户端：发布帖子与同步互动数据

use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{
    ConnectionOk, ProviderClient, ProviderConfig, ProviderKind, ProviderRequest, ProviderResponse,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::http::{endpoint, HttpTransport};

const ENGAGEMENT_FIELDS: &str = "likes.summary(true),comments.summary(true),shares";

#[derive(Debug, Deserialize)]
struct PostCreated {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    #[serde(default)]
    total_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Edge {
    #[serde(default)]
    summary: Summary,
}

#[derive(Debug, Default, Deserialize)]
struct Shares {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct PostEngagement {
    #[serde(default)]
    likes: Edge,
    #[serde(default)]
    comments: Edge,
    #[serde(default)]
    shares: Shares,
}

pub struct FacebookClient {
    transport: HttpTransport,
}

impl FacebookClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProviderClient for FacebookClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Facebook
    }

    #[instrument(skip_all, fields(config_id = %config.id, operation = request.operation()))]
    async fn call(
        &self,
        config: &ProviderConfig,
        request: ProviderRequest,
    ) -> PipelineResult<ProviderResponse> {
        match request {
            ProviderRequest::Publish { generated, target } => {
                let url = endpoint(&config.base_url, &format!("{}/feed", target.page_id));
                let request = self.transport.client().post(url).form(&[
                    ("message", generated.text.as_str()),
                    ("access_token", config.api_key.as_str()),
                ]);
                let created: PostCreated = self.transport.send_json(request).await?;
                info!("已发布到主页 {}: post_id={}", target.page_id, created.id);
                Ok(ProviderResponse::Published {
                    external_post_id: created.id,
                })
            }
            ProviderRequest::SyncEngagement { post, .. } => {
                let url = endpoint(&config.base_url, &post.external_post_id);
                let request = self.transport.client().get(url).query(&[
                    ("fields", ENGAGEMENT_FIELDS),
                    ("access_token", config.api_key.as_str()),
                ]);
                let engagement: PostEngagement = self.transport.send_json(request).await?;
                Ok(ProviderResponse::Engagement {
                    likes: engagement.likes.summary.total_count,
                    comments: engagement.comments.summary.total_count,
                    shares: engagement.shares.count,
                })
            }
            other => Err(PipelineError::validation(
                "request",
                format!("Facebook不支持操作: {}", other.operation()),
            )),
        }
    }

    async fn test_connection(&self, config: &ProviderConfig) -> PipelineResult<ConnectionOk> {
        let request = self
            .transport
            .client()
            .get(endpoint(&config.base_url, "me"))
            .query(&[("access_token", config.api_key.as_str())]);
        self.transport.probe(request).await
    }
}
