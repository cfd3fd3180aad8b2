use axum::{
    routing::{get, post},
    Router,
};
use pipeline_dispatcher::PipelineServices;
use std::sync::Arc;

use crate::handlers::{
    catalog::{
        create_agent, create_target, create_website, list_agents, list_contents, list_generated,
        list_posts, list_targets, list_urls, list_websites,
    },
    configs::{
        activate_config, create_config, delete_config, get_config, list_configs, quota_status,
        test_connection, update_config,
    },
    events::stream_events,
    health::health_check,
    jobs::{clear_queue, get_job, list_jobs, retry_job},
    stages::{extract_content, extract_urls, generate_content, publish, sync_engagement},
    system::{control, get_dashboard_stats, get_status},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<PipelineServices>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 提供方配置
        .route("/configs", get(list_configs).post(create_config))
        .route(
            "/configs/{id}",
            get(get_config).put(update_config).delete(delete_config),
        )
        .route("/configs/{id}/activate", post(activate_config))
        .route("/configs/{id}/test-connection", post(test_connection))
        .route("/configs/{id}/quota-status", get(quota_status))
        // 产物与阶段
        .route("/websites", get(list_websites).post(create_website))
        .route("/websites/{id}/extract-urls-and-save", post(extract_urls))
        .route("/urls", get(list_urls))
        .route("/urls/extract-content", post(extract_content))
        .route("/content", get(list_contents))
        .route("/content/generate", post(generate_content))
        .route("/generated", get(list_generated))
        .route("/generated/{id}/publish", post(publish))
        .route("/posts", get(list_posts))
        .route("/posts/{id}/sync-engagement", post(sync_engagement))
        .route("/agents", get(list_agents).post(create_agent))
        .route("/targets", get(list_targets).post(create_target))
        // 任务账本
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/retry", post(retry_job))
        .route("/queues/{type}/clear", post(clear_queue))
        // 系统
        .route("/status", get(get_status))
        .route("/dashboard-stats", get(get_dashboard_stats))
        .route("/system/control", post(control))
        .route("/events", get(stream_events))
        .with_state(state)
}
