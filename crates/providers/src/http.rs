use std::time::{Duration, Instant};

use pipeline_core::{config::ProvidersConfig, PipelineError, PipelineResult};
use pipeline_domain::ConnectionOk;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// 上游错误信息保留的最大长度
const MAX_UPSTREAM_MESSAGE: usize = 512;

/// 各提供方共用的HTTP传输层，统一超时与错误映射
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ProvidersConfig) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| PipelineError::config_error(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// 发送请求并把成功响应解析为JSON
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> PipelineResult<T> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("提供方返回错误状态: status={}", status.as_u16());
            return Err(PipelineError::ProviderError {
                upstream_message: format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
            });
        }

        response.json::<T>().await.map_err(|e| PipelineError::ProviderError {
            upstream_message: format!("无法解析提供方响应: {e}"),
        })
    }

    /// 健康探测，只关心是否返回成功状态
    pub async fn probe(&self, request: RequestBuilder) -> PipelineResult<ConnectionOk> {
        let start = Instant::now();
        let response = request.send().await.map_err(map_transport_error)?;
        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ProviderError {
                upstream_message: format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
            });
        }

        debug!("连接测试成功: latency={}ms", latency_ms);
        Ok(ConnectionOk {
            latency_ms,
            message: format!("连接正常 (HTTP {})", status.as_u16()),
        })
    }
}

/// 连接失败与超时属于网络错误，可以重试
pub fn map_transport_error(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Network(format!("请求超时: {err}"))
    } else {
        PipelineError::Network(format!("HTTP请求失败: {err}"))
    }
}

/// 拼接基础地址与路径，容忍两侧多余的斜杠
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_UPSTREAM_MESSAGE {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_UPSTREAM_MESSAGE).collect();
    out.push_str("...");
    out
}
