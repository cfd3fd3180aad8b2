//! Apify抓取客户端
//!
//! URL发现与正文抽取都以同步方式运行actor并直接读取数据集条目。

use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{
    ConnectionOk, DiscoveredUrl, ProviderClient, ProviderConfig, ProviderKind, ProviderRequest,
    ProviderResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::http::{endpoint, HttpTransport};

/// 抓取站点链接的actor
pub const URL_DISCOVERY_ACTOR: &str = "apify~cheerio-scraper";
/// 抽取单页正文的actor
pub const CONTENT_ACTOR: &str = "apify~website-content-crawler";

#[derive(Debug, Deserialize)]
struct LinkItem {
    url: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

pub struct ApifyClient {
    transport: HttpTransport,
}

impl ApifyClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    async fn run_actor<T: serde::de::DeserializeOwned>(
        &self,
        config: &ProviderConfig,
        actor: &str,
        input: serde_json::Value,
    ) -> PipelineResult<Vec<T>> {
        let url = endpoint(
            &config.base_url,
            &format!("acts/{actor}/run-sync-get-dataset-items"),
        );
        let request = self
            .transport
            .client()
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&input);
        self.transport.send_json(request).await
    }
}

#[async_trait]
impl ProviderClient for ApifyClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apify
    }

    #[instrument(skip_all, fields(config_id = %config.id, operation = request.operation()))]
    async fn call(
        &self,
        config: &ProviderConfig,
        request: ProviderRequest,
    ) -> PipelineResult<ProviderResponse> {
        match request {
            ProviderRequest::ExtractUrls { website } => {
                let input = json!({
                    "startUrls": [{ "url": website.url }],
                    "selectors": website.selectors,
                });
                let items: Vec<LinkItem> = self.run_actor(config, URL_DISCOVERY_ACTOR, input).await?;
                let urls: Vec<DiscoveredUrl> = items
                    .into_iter()
                    .filter_map(|item| {
                        item.url
                            .filter(|u| !u.trim().is_empty())
                            .map(|url| DiscoveredUrl { url, title: item.title })
                    })
                    .collect();
                info!("站点 {} 发现 {} 个URL", website.id, urls.len());
                Ok(ProviderResponse::Urls(urls))
            }
            ProviderRequest::ExtractContent { url, selectors } => {
                let input = json!({
                    "startUrls": [{ "url": url.url }],
                    "maxCrawlPages": 1,
                    "selectors": selectors,
                });
                let items: Vec<PageItem> = self.run_actor(config, CONTENT_ACTOR, input).await?;
                let page = items.into_iter().next().ok_or_else(|| PipelineError::ProviderError {
                    upstream_message: format!("页面 {} 没有返回内容", url.url),
                })?;
                let body = page.text.unwrap_or_default();
                if body.trim().is_empty() {
                    return Err(PipelineError::ProviderError {
                        upstream_message: format!("页面 {} 正文为空", url.url),
                    });
                }
                Ok(ProviderResponse::Content {
                    title: page.title.or(url.title).unwrap_or_default(),
                    body,
                    images: page.images,
                })
            }
            other => Err(PipelineError::validation(
                "request",
                format!("Apify不支持操作: {}", other.operation()),
            )),
        }
    }

    async fn test_connection(&self, config: &ProviderConfig) -> PipelineResult<ConnectionOk> {
        let request = self
            .transport
            .client()
            .get(endpoint(&config.base_url, "users/me"))
            .bearer_auth(&config.api_key);
        self.transport.probe(request).await
    }
}
