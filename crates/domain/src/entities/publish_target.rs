use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 发布时间表，`start_time`/`end_time` 为 `HH:MM`，`weekdays` 取值 0(周日)..6(周六)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostingSchedule {
    pub enabled: bool,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub weekdays: Vec<u8>,
    pub timezone: String,
}

impl Default for PostingSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            start_time: "00:00".to_string(),
            end_time: "23:59".to_string(),
            weekdays: Vec::new(),
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishingPolicy {
    pub max_posts_per_day: u32,
    #[serde(default)]
    pub posts_today: u32,
    /// `posts_today` 对应的本地日期，换日后计数惰性归零
    #[serde(default)]
    pub posts_today_date: Option<NaiveDate>,
    /// 两次发布之间的最小间隔（分钟）
    #[serde(default)]
    pub cooldown_period: u32,
    #[serde(default)]
    pub posting_schedule: PostingSchedule,
}

impl Default for PublishingPolicy {
    fn default() -> Self {
        Self {
            max_posts_per_day: 10,
            posts_today: 0,
            posts_today_date: None,
            cooldown_period: 0,
            posting_schedule: PostingSchedule::default(),
        }
    }
}

/// 发布目标（社交主页）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishTarget {
    pub id: String,
    pub name: String,
    pub page_id: String,
    pub config_id: String,
    pub policy: PublishingPolicy,
    pub last_published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PublishTarget {
    pub fn new(
        name: String,
        page_id: String,
        config_id: String,
        policy: PublishingPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            page_id,
            config_id,
            policy,
            last_published_at: None,
            created_at: now,
        }
    }
}
