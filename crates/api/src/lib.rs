//! # Pipeline API
//!
//! 内容流水线的REST接口，基于Axum构建。
//!
//! ## 端点
//!
//! ### 提供方配置
//! - `GET/POST /configs`，`GET/PUT/DELETE /configs/{id}`
//! - `POST /configs/{id}/activate` - 激活配置，同作用域其他配置停用
//! - `POST /configs/{id}/test-connection` - 连通性探测，不消耗配额
//! - `GET /configs/{id}/quota-status` - 各配额窗口用量
//!
//! ### 阶段
//! - `POST /websites/{id}/extract-urls-and-save`
//! - `POST /urls/extract-content`
//! - `POST /content/generate`
//! - `POST /generated/{id}/publish`
//! - `POST /posts/{id}/sync-engagement`
//!
//! 阶段完成返回 `200`，准入控制推迟返回 `202`，
//! 响应体为 `{deferred: true, reason, jobId?}`。
//!
//! ### 任务与系统
//! - `GET /jobs`，`GET /jobs/{id}`，`POST /jobs/{id}/retry`
//! - `POST /queues/{type}/clear`
//! - `GET /status`，`GET /dashboard-stats`，`POST /system/control`
//! - `GET /events` - 推送事件的SSE流
//!
//! 除健康检查与事件流外，所有响应使用 `{success, data, message, timestamp}` 信封，
//! 错误响应为 `{error: {message, type, code, suggestions, timestamp}}`。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use pipeline_core::config::ApiConfig;
use pipeline_dispatcher::PipelineServices;
use std::sync::Arc;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(services: Arc<PipelineServices>, api_config: &ApiConfig) -> Router {
    let router = create_routes(AppState { services }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
