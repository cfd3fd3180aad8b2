//! 阶段触发接口
//!
//! 阶段完成时返回 200 和产物；准入控制推迟时返回 202，
//! 响应体带上推迟原因和保持待处理的任务ID。

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use pipeline_dispatcher::StageOutcome;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::ApiResult,
    response::{accepted, ApiResponse},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractContentRequest {
    pub url_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub source_entity_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub reference_content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub target_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredBody {
    pub deferred: bool,
    pub reason: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

fn stage_response(outcome: StageOutcome) -> Response {
    match outcome {
        StageOutcome::Completed { job, artifact } => ApiResponse::success_with_message(
            artifact,
            format!("任务 {} 已完成", job.id),
        )
        .into_response(),
        StageOutcome::Deferred { job, reason } => {
            info!(reason = reason.code(), "阶段请求被推迟");
            let body = DeferredBody {
                deferred: true,
                reason: reason.code(),
                detail: reason.to_string(),
                job_id: job.map(|j| j.id),
            };
            accepted(body, reason.user_message().to_string()).into_response()
        }
    }
}

pub async fn extract_urls(
    State(state): State<AppState>,
    Path(website_id): Path<String>,
) -> ApiResult<Response> {
    let outcome = state.services.orchestrator.extract_urls(&website_id).await?;
    Ok(stage_response(outcome))
}

pub async fn extract_content(
    State(state): State<AppState>,
    Json(request): Json<ExtractContentRequest>,
) -> ApiResult<Response> {
    let outcome = state
        .services
        .orchestrator
        .extract_content(&request.url_id)
        .await?;
    Ok(stage_response(outcome))
}

pub async fn generate_content(
    State(state): State<AppState>,
    Json(request): Json<GenerateContentRequest>,
) -> ApiResult<Response> {
    let outcome = state
        .services
        .orchestrator
        .generate_content(
            &request.source_entity_id,
            &request.agent_id,
            request.reference_content,
        )
        .await?;
    Ok(stage_response(outcome))
}

pub async fn publish(
    State(state): State<AppState>,
    Path(generated_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<Response> {
    let outcome = state
        .services
        .orchestrator
        .publish(&generated_id, &request.target_id)
        .await?;
    Ok(stage_response(outcome))
}

pub async fn sync_engagement(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<Response> {
    let outcome = state.services.orchestrator.sync_engagement(&post_id).await?;
    Ok(stage_response(outcome))
}
