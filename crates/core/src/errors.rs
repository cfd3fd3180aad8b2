use thiserror::Error;

use crate::types::{JobType, ProviderScope, PublishingBlockReason, TimeFrame};

/// 流水线错误类型定义
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("配额已耗尽: config={config_id}, 窗口={window}")]
    QuotaExceeded { config_id: String, window: TimeFrame },

    #[error("配置配额处于临界状态，无法激活: config={config_id}")]
    ConfigExhausted { config_id: String },

    #[error("已有相同实体的任务正在处理: type={job_type}, entity={source_entity_id}")]
    DuplicateGeneration {
        job_type: JobType,
        source_entity_id: String,
    },

    #[error("重试次数已用尽: job={job_id}, 已重试{retry_count}次, 上限{max_retries}次")]
    RetryExhausted {
        job_id: String,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("发布被策略阻止: {reason}")]
    PublishingBlocked { reason: PublishingBlockReason },

    #[error("数据验证失败: {field} - {message}")]
    ValidationError { field: String, message: String },

    #[error("网络连接失败: {0}")]
    Network(String),

    #[error("提供方返回错误: {upstream_message}")]
    ProviderError { upstream_message: String },

    #[error("提供方配置不存在: id={id}")]
    ConfigNotFound { id: String },

    #[error("任务不存在: id={id}")]
    JobNotFound { id: String },

    #[error("{kind}不存在: id={id}")]
    ArtifactNotFound { kind: String, id: String },

    #[error("作用域{scope}没有激活的提供方配置")]
    NoActiveConfig { scope: ProviderScope },

    #[error("无效的状态转换: job={job_id}, 当前状态={from}, 操作={action}")]
    InvalidTransition {
        job_id: String,
        from: String,
        action: String,
    },

    #[error("进度不能回退: job={job_id}, 当前={current}, 请求={requested}")]
    ProgressRegression {
        job_id: String,
        current: u8,
        requested: u8,
    },

    #[error("数据库操作失败: {0}")]
    Database(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("数据序列化错误: {0}")]
    Serialization(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::ProviderError {
            upstream_message: msg.into(),
        }
    }
    pub fn config_not_found<S: Into<String>>(id: S) -> Self {
        Self::ConfigNotFound { id: id.into() }
    }
    pub fn job_not_found<S: Into<String>>(id: S) -> Self {
        Self::JobNotFound { id: id.into() }
    }
    pub fn artifact_not_found<K: Into<String>, S: Into<String>>(kind: K, id: S) -> Self {
        Self::ArtifactNotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 稳定的错误代码，用于API响应和推送事件的 `reason`
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::QuotaExceeded { .. } => "quota-exceeded",
            PipelineError::ConfigExhausted { .. } => "config-exhausted",
            PipelineError::DuplicateGeneration { .. } => "duplicate-generation",
            PipelineError::RetryExhausted { .. } => "retry-exhausted",
            PipelineError::PublishingBlocked { .. } => "publishing-blocked",
            PipelineError::ValidationError { .. } => "validation-error",
            PipelineError::Network(_) => "network-error",
            PipelineError::ProviderError { .. } => "provider-error",
            PipelineError::ConfigNotFound { .. } => "config-not-found",
            PipelineError::JobNotFound { .. } => "job-not-found",
            PipelineError::ArtifactNotFound { .. } => "artifact-not-found",
            PipelineError::NoActiveConfig { .. } => "no-active-config",
            PipelineError::InvalidTransition { .. } => "invalid-transition",
            PipelineError::ProgressRegression { .. } => "progress-regression",
            PipelineError::Database(_) => "database-error",
            PipelineError::Configuration(_) => "configuration-error",
            PipelineError::Serialization(_) => "serialization-error",
            PipelineError::Internal(_) => "internal-error",
        }
    }

    /// 准入控制拒绝：任务保持待处理或不入队，由调用方稍后重试
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::QuotaExceeded { .. }
                | PipelineError::DuplicateGeneration { .. }
                | PipelineError::PublishingBlocked { .. }
        )
    }

    /// 终态错误：写入任务的error字段并向用户展示
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::RetryExhausted { .. }
                | PipelineError::ProviderError { .. }
                | PipelineError::ValidationError { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Network(_) | PipelineError::Database(_) | PipelineError::QuotaExceeded { .. }
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            PipelineError::QuotaExceeded { .. } => "提供方配额已用尽，任务将在配额重置后执行",
            PipelineError::ConfigExhausted { .. } => "该配置配额即将耗尽，无法激活",
            PipelineError::DuplicateGeneration { .. } => "相同内容的任务正在处理中",
            PipelineError::RetryExhausted { .. } => "任务重试次数已达上限",
            PipelineError::PublishingBlocked { .. } => "当前不满足发布策略，请稍后再试",
            PipelineError::ValidationError { .. } => "输入数据验证失败",
            PipelineError::Network(_) => "网络连接失败，请稍后重试",
            PipelineError::ProviderError { .. } => "外部服务返回错误",
            PipelineError::ConfigNotFound { .. } => "请求的提供方配置不存在",
            PipelineError::JobNotFound { .. } => "请求的任务不存在",
            PipelineError::ArtifactNotFound { .. } => "请求的资源不存在",
            PipelineError::NoActiveConfig { .. } => "没有可用的提供方配置",
            PipelineError::InvalidTransition { .. } => "任务当前状态不允许该操作",
            PipelineError::ProgressRegression { .. } => "任务进度不能回退",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_rejections_are_not_terminal() {
        let err = PipelineError::QuotaExceeded {
            config_id: "cfg".to_string(),
            window: TimeFrame::Day,
        };
        assert!(err.is_admission_rejection());
        assert!(!err.is_terminal());

        let err = PipelineError::provider("502 bad gateway");
        assert!(err.is_terminal());
        assert!(!err.is_admission_rejection());
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::RetryExhausted {
            job_id: "j1".to_string(),
            retry_count: 3,
            max_retries: 3,
        };
        assert!(err.to_string().contains("j1"));
        assert_eq!(err.user_message(), "任务重试次数已达上限");
    }
}
