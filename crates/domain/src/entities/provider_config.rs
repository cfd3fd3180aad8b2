use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use pipeline_core::{PipelineError, ProviderScope, TimeFrame};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quota;

/// 提供方类型，决定调用实现和所属作用域
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Apify,
    Openai,
    Facebook,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Apify => "apify",
            ProviderKind::Openai => "openai",
            ProviderKind::Facebook => "facebook",
        }
    }

    pub fn scope(&self) -> ProviderScope {
        match self {
            ProviderKind::Apify => ProviderScope::Extraction,
            ProviderKind::Openai => ProviderScope::Generation,
            ProviderKind::Facebook => ProviderScope::Publishing,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apify" => Ok(ProviderKind::Apify),
            "openai" => Ok(ProviderKind::Openai),
            "facebook" => Ok(ProviderKind::Facebook),
            _ => Err(PipelineError::validation("kind", format!("未知的提供方类型: {s}"))),
        }
    }
}

/// 三个窗口的请求上限。`None` 表示该窗口不限量，`Some(0)` 表示不允许任何请求
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotaLimits {
    pub per_hour: Option<u64>,
    pub per_day: Option<u64>,
    pub per_month: Option<u64>,
}

impl QuotaLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn limit(&self, window: TimeFrame) -> Option<u64> {
        match window {
            TimeFrame::Hour => self.per_hour,
            TimeFrame::Day => self.per_day,
            TimeFrame::Month => self.per_month,
        }
    }
}

/// 用量计数，只能由配额账本修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub requests_this_hour: u64,
    pub requests_today: u64,
    pub requests_this_month: u64,
    pub hour_reset_at: DateTime<Utc>,
    pub day_reset_at: DateTime<Utc>,
    pub month_reset_at: DateTime<Utc>,
    pub last_reset_date: Option<NaiveDate>,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl UsageCounters {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            requests_this_hour: 0,
            requests_today: 0,
            requests_this_month: 0,
            hour_reset_at: quota::next_boundary(TimeFrame::Hour, now),
            day_reset_at: quota::next_boundary(TimeFrame::Day, now),
            month_reset_at: quota::next_boundary(TimeFrame::Month, now),
            last_reset_date: Some(now.date_naive()),
            last_request_at: None,
        }
    }

    pub fn used(&self, window: TimeFrame) -> u64 {
        match window {
            TimeFrame::Hour => self.requests_this_hour,
            TimeFrame::Day => self.requests_today,
            TimeFrame::Month => self.requests_this_month,
        }
    }

    pub fn reset_at(&self, window: TimeFrame) -> DateTime<Utc> {
        match window {
            TimeFrame::Hour => self.hour_reset_at,
            TimeFrame::Day => self.day_reset_at,
            TimeFrame::Month => self.month_reset_at,
        }
    }

    pub(crate) fn counter_mut(&mut self, window: TimeFrame) -> &mut u64 {
        match window {
            TimeFrame::Hour => &mut self.requests_this_hour,
            TimeFrame::Day => &mut self.requests_today,
            TimeFrame::Month => &mut self.requests_this_month,
        }
    }

    pub(crate) fn reset_at_mut(&mut self, window: TimeFrame) -> &mut DateTime<Utc> {
        match window {
            TimeFrame::Hour => &mut self.hour_reset_at,
            TimeFrame::Day => &mut self.day_reset_at,
            TimeFrame::Month => &mut self.month_reset_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub is_active: bool,
    pub quota_limits: QuotaLimits,
    pub usage: UsageCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfig {
    pub fn new(
        name: String,
        kind: ProviderKind,
        base_url: String,
        api_key: String,
        quota_limits: QuotaLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            kind,
            base_url,
            api_key,
            is_active: false,
            quota_limits,
            usage: UsageCounters::fresh(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn scope(&self) -> ProviderScope {
        self.kind.scope()
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::validation("name", "配置名称不能为空"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(PipelineError::validation("baseUrl", "baseUrl必须以http://或https://开头"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_api_key_never_serialized() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let config = ProviderConfig::new(
            "openai-main".to_string(),
            ProviderKind::Openai,
            "https://api.openai.com".to_string(),
            "sk-secret".to_string(),
            QuotaLimits::default(),
            now,
        );
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("\"kind\":\"openai\""));
    }

    #[test]
    fn test_missing_limits_deserialize_as_unlimited() {
        let limits: QuotaLimits = serde_json::from_str(r#"{"perHour":0,"perDay":null}"#).unwrap();
        assert_eq!(limits.per_hour, Some(0));
        assert_eq!(limits.per_day, None);
        assert_eq!(limits.per_month, None);
    }

    #[test]
    fn test_kind_scope_mapping() {
        assert_eq!(ProviderKind::Apify.scope(), ProviderScope::Extraction);
        assert_eq!(ProviderKind::Facebook.scope(), ProviderScope::Publishing);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::Openai);
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let now = Utc::now();
        let config = ProviderConfig::new(
            "x".to_string(),
            ProviderKind::Apify,
            "ftp://example.com".to_string(),
            String::new(),
            QuotaLimits::default(),
            now,
        );
        assert!(matches!(
            config.validate(),
            Err(PipelineError::ValidationError { ref field, .. }) if field == "baseUrl"
        ));
    }
}
