use std::time::Instant;

use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{
    ConnectionOk, GenerationMetadata, ProviderClient, ProviderConfig, ProviderKind,
    ProviderRequest, ProviderResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::http::{endpoint, HttpTransport};

/// 每千token的估算费用（美元）
const COST_PER_1K_TOKENS: f64 = 0.002;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

/// OpenAI兼容的对话补全客户端
pub struct OpenAiClient {
    transport: HttpTransport,
}

impl OpenAiClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

fn estimate_cost(tokens: u64) -> f64 {
    (tokens as f64 / 1000.0) * COST_PER_1K_TOKENS
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    #[instrument(skip_all, fields(config_id = %config.id, operation = request.operation()))]
    async fn call(
        &self,
        config: &ProviderConfig,
        request: ProviderRequest,
    ) -> PipelineResult<ProviderResponse> {
        let operation = request.operation();
        let ProviderRequest::GenerateContent {
            content,
            agent,
            reference_content,
        } = request
        else {
            return Err(PipelineError::validation(
                "request",
                format!("OpenAI不支持操作: {operation}"),
            ));
        };

        let mut user_prompt = format!("{}\n\n{}", content.title, content.body);
        if let Some(reference) = reference_content.filter(|r| !r.trim().is_empty()) {
            user_prompt.push_str("\n\n参考内容:\n");
            user_prompt.push_str(&reference);
        }

        let body = json!({
            "model": agent.model,
            "messages": [
                { "role": "system", "content": agent.persona },
                { "role": "user", "content": user_prompt },
            ],
        });

        debug!(model = %agent.model, "发送生成请求");
        let start = Instant::now();
        let http_request = self
            .transport
            .client()
            .post(endpoint(&config.base_url, "chat/completions"))
            .bearer_auth(&config.api_key)
            .json(&body);
        let response: ChatResponse = self.transport.send_json(http_request).await?;
        let processing_time_ms = start.elapsed().as_millis() as u64;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::provider("模型没有返回内容"))?;
        let tokens_used = response.usage.map(|u| u.total_tokens).unwrap_or(0);

        Ok(ProviderResponse::Generated {
            text,
            metadata: GenerationMetadata {
                processing_time_ms,
                tokens_used,
                cost: estimate_cost(tokens_used),
            },
        })
    }

    async fn test_connection(&self, config: &ProviderConfig) -> PipelineResult<ConnectionOk> {
        let request = self
            .transport
            .client()
            .get(endpoint(&config.base_url, "models"))
            .bearer_auth(&config.api_key);
        self.transport.probe(request).await
    }
}
