//! 提供方配置管理

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use pipeline_dispatcher::{CreateConfigRequest, UpdateConfigRequest};
use tracing::info;

use crate::{
    error::ApiResult,
    response::{created, success, ApiResponse},
    routes::AppState,
};

pub async fn list_configs(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let configs = state.services.selector.list().await?;
    Ok(success(configs))
}

pub async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<CreateConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    let config = state.services.selector.create(request).await?;
    info!(config_id = %config.id, kind = %config.kind, "创建提供方配置");
    Ok(created(config))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let config = state.services.selector.get(&id).await?;
    Ok(success(config))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    let config = state.services.selector.update(&id, request).await?;
    Ok(success(config))
}

pub async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.services.selector.delete(&id).await?;
    Ok(ApiResponse::success_empty_with_message(format!("配置 {} 已删除", id)))
}

/// 激活配置，同一作用域内的其他配置会被停用
pub async fn activate_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let config = state.services.selector.activate(&id).await?;
    Ok(success(config))
}

/// 健康探测，不消耗配额
pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let result = state.services.selector.test_connection(&id).await?;
    Ok(success(result))
}

pub async fn quota_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = state.services.quota.get_status(&id).await?;
    Ok(success(report))
}
