//! 发布策略检查
//!
//! 检查顺序：每日上限、发布时间表、冷却期。时间表按目标所在时区判断，
//! 起止时间均为闭区间，结束早于开始时视为跨午夜。

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use pipeline_core::{PipelineError, PipelineResult, PublishingBlockReason};

use crate::entities::{PostingSchedule, PublishTarget, PublishingPolicy};

fn parse_timezone(name: &str) -> PipelineResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| PipelineError::validation("postingSchedule.timezone", format!("未知的时区: {name}")))
}

fn parse_time(field: &str, value: &str) -> PipelineResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| PipelineError::validation(field, format!("时间格式应为HH:MM: {value}")))
}

/// 目标时区下的本地日期，时区无效时按UTC计算
fn local_date(policy: &PublishingPolicy, now: DateTime<Utc>) -> NaiveDate {
    match parse_timezone(&policy.posting_schedule.timezone) {
        Ok(tz) => now.with_timezone(&tz).date_naive(),
        Err(_) => now.date_naive(),
    }
}

impl PublishingPolicy {
    /// 今天已发布数量。记录日期早于今天时视为0，没有日期时按今天计
    pub fn effective_posts_today(&self, now: DateTime<Utc>) -> u32 {
        match self.posts_today_date {
            None => self.posts_today,
            Some(date) if date == local_date(self, now) => self.posts_today,
            Some(_) => 0,
        }
    }

    /// 给没有日期的计数补上今天的本地日期
    pub fn stamp_posts_today(&mut self, now: DateTime<Utc>) {
        if self.posts_today_date.is_none() {
            self.posts_today_date = Some(local_date(self, now));
        }
    }

    pub fn record_publish(&mut self, now: DateTime<Utc>) {
        self.posts_today = self.effective_posts_today(now) + 1;
        self.posts_today_date = Some(local_date(self, now));
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let schedule = &self.posting_schedule;
        parse_timezone(&schedule.timezone)?;
        parse_time("postingSchedule.startTime", &schedule.start_time)?;
        parse_time("postingSchedule.endTime", &schedule.end_time)?;
        if let Some(day) = schedule.weekdays.iter().find(|d| **d > 6) {
            return Err(PipelineError::validation(
                "postingSchedule.weekdays",
                format!("星期取值必须在0到6之间: {day}"),
            ));
        }
        Ok(())
    }
}

impl PostingSchedule {
    pub fn allows(&self, now: DateTime<Utc>) -> PipelineResult<bool> {
        if !self.enabled {
            return Ok(true);
        }
        let tz = parse_timezone(&self.timezone)?;
        let start = parse_time("postingSchedule.startTime", &self.start_time)?;
        let end = parse_time("postingSchedule.endTime", &self.end_time)?;

        let local = now.with_timezone(&tz);
        let weekday = local.weekday().num_days_from_sunday() as u8;
        if !self.weekdays.is_empty() && !self.weekdays.contains(&weekday) {
            return Ok(false);
        }

        let time = local.time();
        let within = if start <= end {
            time >= start && time <= end
        } else {
            time >= start || time <= end
        };
        Ok(within)
    }
}

/// 发布前的策略准入检查，违反时返回 `PublishingBlocked`
pub fn check_publish_allowed(target: &PublishTarget, now: DateTime<Utc>) -> PipelineResult<()> {
    let policy = &target.policy;

    if policy.effective_posts_today(now) >= policy.max_posts_per_day {
        return Err(PipelineError::PublishingBlocked {
            reason: PublishingBlockReason::DailyLimit,
        });
    }

    if !policy.posting_schedule.allows(now)? {
        return Err(PipelineError::PublishingBlocked {
            reason: PublishingBlockReason::OutsideSchedule,
        });
    }

    if let Some(last) = target.last_published_at {
        if now - last < Duration::minutes(i64::from(policy.cooldown_period)) {
            return Err(PipelineError::PublishingBlocked {
                reason: PublishingBlockReason::Cooldown,
            });
        }
    }

    Ok(())
}
