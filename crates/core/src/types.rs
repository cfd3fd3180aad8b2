//! 跨crate共享的基础枚举
//!
//! 错误类型需要引用这些枚举，因此它们放在core中，由domain重新导出。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// 配额时间窗口
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    Hour,
    Day,
    Month,
}

impl TimeFrame {
    pub const ALL: [TimeFrame; 3] = [TimeFrame::Hour, TimeFrame::Day, TimeFrame::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Hour => "hour",
            TimeFrame::Day => "day",
            TimeFrame::Month => "month",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFrame {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(TimeFrame::Hour),
            "day" => Ok(TimeFrame::Day),
            "month" => Ok(TimeFrame::Month),
            _ => Err(PipelineError::validation("timeFrame", format!("未知的时间窗口: {s}"))),
        }
    }
}

/// 提供方作用域，同一作用域内最多只有一个激活的配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderScope {
    Extraction,
    Generation,
    Publishing,
}

impl ProviderScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderScope::Extraction => "extraction",
            ProviderScope::Generation => "generation",
            ProviderScope::Publishing => "publishing",
        }
    }
}

impl fmt::Display for ProviderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 流水线任务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ExtractUrls,
    ExtractContent,
    GenerateContent,
    Publish,
    SyncEngagement,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::ExtractUrls,
        JobType::ExtractContent,
        JobType::GenerateContent,
        JobType::Publish,
        JobType::SyncEngagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ExtractUrls => "extract_urls",
            JobType::ExtractContent => "extract_content",
            JobType::GenerateContent => "generate_content",
            JobType::Publish => "publish",
            JobType::SyncEngagement => "sync_engagement",
        }
    }

    /// 推送事件名前缀，例如 `generation-started`
    pub fn stage(&self) -> &'static str {
        match self {
            JobType::ExtractUrls => "extraction",
            JobType::ExtractContent => "content-extraction",
            JobType::GenerateContent => "generation",
            JobType::Publish => "publishing",
            JobType::SyncEngagement => "engagement-sync",
        }
    }

    pub fn scope(&self) -> ProviderScope {
        match self {
            JobType::ExtractUrls | JobType::ExtractContent => ProviderScope::Extraction,
            JobType::GenerateContent => ProviderScope::Generation,
            JobType::Publish | JobType::SyncEngagement => ProviderScope::Publishing,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = PipelineError;

    /// 同时接受任务类型名和阶段名（`extract_urls` 或 `extraction`）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.stage() == s)
            .ok_or_else(|| PipelineError::validation("type", format!("未知的任务类型: {s}")))
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(PipelineError::validation("status", format!("未知的任务状态: {s}"))),
        }
    }
}

/// 发布被拒绝的原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PublishingBlockReason {
    DailyLimit,
    OutsideSchedule,
    Cooldown,
}

impl PublishingBlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishingBlockReason::DailyLimit => "daily-limit",
            PublishingBlockReason::OutsideSchedule => "outside-schedule",
            PublishingBlockReason::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for PublishingBlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
