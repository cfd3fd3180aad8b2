use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use pipeline_core::{JobStatus, JobType};
use pipeline_domain::JobFilter;
use serde::Deserialize;
use tracing::info;

use super::PaginationQuery;
use crate::{
    error::ApiResult,
    response::{success, ApiResponse, PaginatedResponse},
    routes::AppState,
};

/// 任务查询参数，`type` 同时接受任务类型名和阶段名
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQueryParams {
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl JobQueryParams {
    fn filter(&self) -> ApiResult<JobFilter> {
        let job_type = self
            .job_type
            .as_deref()
            .map(str::parse::<JobType>)
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<JobStatus>)
            .transpose()?;
        Ok(JobFilter { job_type, status })
    }
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = params.filter()?;
    let request = PaginationQuery {
        page: params.page,
        page_size: params.page_size,
    }
    .to_request();
    let page = state.services.ledger.list(&filter, request).await?;
    Ok(success(PaginatedResponse::from_page(page, request)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.services.ledger.get(&id).await?))
}

/// 失败任务回到待处理，由排空循环重新执行
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state.services.ledger.retry(&id).await?;
    Ok(ApiResponse::success_with_message(
        job,
        "任务已重新排队".to_string(),
    ))
}

/// 清空某类任务的待处理队列，正在处理的任务不受影响
pub async fn clear_queue(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job_type: JobType = job_type.parse()?;
    let removed = state.services.ledger.clear_queue(job_type).await?;
    info!(job_type = %job_type, removed, "清空待处理队列");
    Ok(ApiResponse::success_with_message(
        serde_json::json!({ "jobType": job_type, "removed": removed }),
        format!("已移除 {} 个待处理任务", removed),
    ))
}
