use axum::{extract::State, response::IntoResponse, Json};
use pipeline_dispatcher::SystemAction;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::ApiResult,
    response::{success, ApiResponse},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub action: SystemAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub action: SystemAction,
    pub drain_running: bool,
}

/// 系统状态：排空循环、队列深度、任务状态分布与对账器视图
pub async fn get_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.services.status().await?))
}

pub async fn get_dashboard_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.services.dashboard_stats().await?))
}

pub async fn control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> ApiResult<impl IntoResponse> {
    let drain_running = state.services.drain.control(request.action).await?;
    info!(action = ?request.action, drain_running, "系统控制");
    Ok(ApiResponse::success(ControlResponse {
        action: request.action,
        drain_running,
    }))
}
