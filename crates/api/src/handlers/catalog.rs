//! 产物目录：网站、代理、发布目标的管理，以及各阶段产物的分页列表

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use pipeline_dispatcher::{CreateAgentRequest, CreateTargetRequest, CreateWebsiteRequest};

use super::PaginationQuery;
use crate::{
    error::ApiResult,
    response::{created, success, PaginatedResponse},
    routes::AppState,
};

pub async fn list_websites(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.services.catalog.list_websites().await?))
}

pub async fn create_website(
    State(state): State<AppState>,
    Json(request): Json<CreateWebsiteRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.services.catalog.create_website(request).await?))
}

pub async fn list_agents(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.services.catalog.list_agents().await?))
}

pub async fn create_agent(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.services.catalog.create_agent(request).await?))
}

pub async fn list_targets(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.services.catalog.list_targets().await?))
}

pub async fn create_target(
    State(state): State<AppState>,
    Json(request): Json<CreateTargetRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.services.catalog.create_target(request).await?))
}

pub async fn list_urls(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<impl IntoResponse> {
    let request = query.to_request();
    let page = state.services.catalog.list_urls(request).await?;
    Ok(success(PaginatedResponse::from_page(page, request)))
}

pub async fn list_contents(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<impl IntoResponse> {
    let request = query.to_request();
    let page = state.services.catalog.list_contents(request).await?;
    Ok(success(PaginatedResponse::from_page(page, request)))
}

pub async fn list_generated(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<impl IntoResponse> {
    let request = query.to_request();
    let page = state.services.catalog.list_generated(request).await?;
    Ok(success(PaginatedResponse::from_page(page, request)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> ApiResult<impl IntoResponse> {
    let request = query.to_request();
    let page = state.services.catalog.list_posts(request).await?;
    Ok(success(PaginatedResponse::from_page(page, request)))
}
