use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipeline_core::PipelineError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("流水线错误: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(err) => pipeline_status(err),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 响应体中的错误类型代码
    pub fn error_type(&self) -> String {
        match self {
            ApiError::Pipeline(err) => err.code().to_uppercase().replace('-', "_"),
            ApiError::BadRequest(_) => "BAD_REQUEST".to_string(),
            ApiError::NotFound => "NOT_FOUND".to_string(),
            ApiError::Internal(_) => "INTERNAL_ERROR".to_string(),
        }
    }
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::ValidationError { .. } => StatusCode::BAD_REQUEST,
        PipelineError::ConfigNotFound { .. }
        | PipelineError::JobNotFound { .. }
        | PipelineError::ArtifactNotFound { .. } => StatusCode::NOT_FOUND,
        PipelineError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::ConfigExhausted { .. }
        | PipelineError::DuplicateGeneration { .. }
        | PipelineError::RetryExhausted { .. }
        | PipelineError::PublishingBlocked { .. }
        | PipelineError::NoActiveConfig { .. }
        | PipelineError::InvalidTransition { .. }
        | PipelineError::ProgressRegression { .. } => StatusCode::CONFLICT,
        PipelineError::Network(_) | PipelineError::ProviderError { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::Database(_)
        | PipelineError::Configuration(_)
        | PipelineError::Serialization(_)
        | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn pipeline_suggestions(err: &PipelineError) -> Vec<String> {
    let suggestions: &[&str] = match err {
        PipelineError::QuotaExceeded { .. } => &[
            "任务保持待处理状态，配额窗口重置后由排空循环执行",
            "使用 GET /configs/{id}/quota-status 查看各窗口用量",
        ],
        PipelineError::ConfigExhausted { .. } => &[
            "该配置的配额占用已达到临界值",
            "请激活其他配置或等待配额窗口重置",
        ],
        PipelineError::DuplicateGeneration { .. } => &[
            "相同实体的任务正在处理中，请等待其完成",
            "使用 GET /jobs 查看任务状态",
        ],
        PipelineError::RetryExhausted { .. } => &["任务重试次数已达上限，请检查失败原因后重新发起阶段请求"],
        PipelineError::PublishingBlocked { .. } => &["请检查发布目标的每日上限、发布时段和冷却时间"],
        PipelineError::ValidationError { .. } => &["请检查请求参数是否符合要求"],
        PipelineError::Network(_) | PipelineError::ProviderError { .. } => &[
            "外部服务调用失败，任务已标记为失败",
            "使用 POST /jobs/{id}/retry 重试任务",
        ],
        PipelineError::ConfigNotFound { .. } => &["使用 GET /configs 查看所有提供方配置"],
        PipelineError::JobNotFound { .. } => &["使用 GET /jobs 查看所有任务"],
        PipelineError::ArtifactNotFound { .. } => &["请确认上一阶段已成功产出该资源"],
        PipelineError::NoActiveConfig { .. } => &[
            "请先创建并激活对应作用域的提供方配置",
            "使用 POST /configs/{id}/activate 激活配置",
        ],
        PipelineError::InvalidTransition { .. } | PipelineError::ProgressRegression { .. } => {
            &["任务当前状态不允许该操作，请刷新任务状态后重试"]
        }
        _ => &[
            "系统遇到内部错误，请稍后重试",
            "查看 GET /health 检查系统状态",
        ],
    };
    suggestions.iter().map(|s| s.to_string()).collect()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, suggestions) = match &self {
            ApiError::Pipeline(err) => {
                let message = if status.is_server_error() {
                    err.user_message().to_string()
                } else {
                    format!("{}: {}", err.user_message(), err)
                };
                (message, pipeline_suggestions(err))
            }
            ApiError::BadRequest(msg) => (
                format!("请求参数错误: {}", msg),
                vec!["请检查请求格式和参数".to_string()],
            ),
            ApiError::NotFound => (
                "请求的资源不存在".to_string(),
                vec!["请检查请求URL是否正确".to_string()],
            ),
            ApiError::Internal(_) => (
                "系统内部错误".to_string(),
                vec!["系统遇到内部错误，请稍后重试".to_string()],
            ),
        };

        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": self.error_type(),
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
