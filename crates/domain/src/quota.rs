//! 配额窗口计算
//!
//! 纯算术，不做任何I/O。窗口按UTC自然边界（整点、零点、每月1日）滚动，
//! 滚动在每次读写前惰性执行，因此错过的周期只会让计数归零一次。

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use pipeline_core::TimeFrame;
use serde::{Deserialize, Serialize};

use crate::entities::{QuotaLimits, UsageCounters};

pub const WARNING_THRESHOLD: f64 = 75.0;
pub const CRITICAL_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum QuotaStatus {
    Normal,
    Warning,
    Critical,
}

/// 单个时间窗口的派生视图，不持久化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaWindow {
    pub time_frame: TimeFrame,
    pub used: u64,
    pub limit: Option<u64>,
    pub percentage: f64,
    pub reset_at: DateTime<Utc>,
    pub status: QuotaStatus,
}

pub fn classify(percentage: f64) -> QuotaStatus {
    if percentage >= CRITICAL_THRESHOLD {
        QuotaStatus::Critical
    } else if percentage >= WARNING_THRESHOLD {
        QuotaStatus::Warning
    } else {
        QuotaStatus::Normal
    }
}

/// 不限量的窗口恒为0，额度为0的窗口视为已用尽
pub fn percentage(used: u64, limit: Option<u64>) -> f64 {
    match limit {
        None => 0.0,
        Some(0) => 100.0,
        Some(limit) => used as f64 / limit as f64 * 100.0,
    }
}

/// `now` 之后的第一个窗口边界
pub fn next_boundary(window: TimeFrame, now: DateTime<Utc>) -> DateTime<Utc> {
    match window {
        TimeFrame::Hour => {
            let start_of_hour = now
                - Duration::seconds(i64::from(now.minute() * 60 + now.second()))
                - Duration::nanoseconds(i64::from(now.nanosecond()));
            start_of_hour + Duration::hours(1)
        }
        TimeFrame::Day => now
            .date_naive()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(now + Duration::days(1)),
        TimeFrame::Month => {
            let (year, month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
                .unwrap_or(now + Duration::days(31))
        }
    }
}

impl UsageCounters {
    /// 到期则清零并把重置时间推进到下一个边界，返回是否发生了滚动。重复调用是幂等的。
    pub fn roll_window(&mut self, window: TimeFrame, now: DateTime<Utc>) -> bool {
        if now < self.reset_at(window) {
            return false;
        }
        *self.counter_mut(window) = 0;
        *self.reset_at_mut(window) = next_boundary(window, now);
        if window == TimeFrame::Day {
            self.last_reset_date = Some(now.date_naive());
        }
        true
    }

    pub fn roll_all(&mut self, now: DateTime<Utc>) -> bool {
        TimeFrame::ALL
            .into_iter()
            .fold(false, |rolled, window| self.roll_window(window, now) || rolled)
    }

    /// 再发一次请求会超限的窗口；多个窗口同时超限时返回重置最晚的那个
    pub fn exceeded_window(&self, limits: &QuotaLimits) -> Option<TimeFrame> {
        [TimeFrame::Month, TimeFrame::Day, TimeFrame::Hour]
            .into_iter()
            .find(|&window| {
                limits
                    .limit(window)
                    .is_some_and(|limit| self.used(window) + 1 > limit)
            })
    }

    /// 预检全部窗口后原子地递增三个计数；被拒绝时计数保持不变
    pub fn admit(
        &mut self,
        limits: &QuotaLimits,
        now: DateTime<Utc>,
    ) -> Result<(), TimeFrame> {
        self.roll_all(now);
        if let Some(window) = self.exceeded_window(limits) {
            return Err(window);
        }
        for window in TimeFrame::ALL {
            *self.counter_mut(window) += 1;
        }
        self.last_request_at = Some(now);
        Ok(())
    }

    pub fn windows(&self, limits: &QuotaLimits) -> [QuotaWindow; 3] {
        TimeFrame::ALL.map(|window| {
            let used = self.used(window);
            let limit = limits.limit(window);
            let pct = percentage(used, limit);
            QuotaWindow {
                time_frame: window,
                used,
                limit,
                percentage: pct,
                reset_at: self.reset_at(window),
                status: classify(pct),
            }
        })
    }
}

/// 占用百分比最高的窗口，决定配置的整体状态
pub fn most_restrictive(windows: &[QuotaWindow]) -> Option<&QuotaWindow> {
    windows
        .iter()
        .max_by(|a, b| a.percentage.total_cmp(&b.percentage))
}

pub fn overall_status(windows: &[QuotaWindow]) -> QuotaStatus {
    most_restrictive(windows)
        .map(|w| w.status)
        .unwrap_or(QuotaStatus::Normal)
}
