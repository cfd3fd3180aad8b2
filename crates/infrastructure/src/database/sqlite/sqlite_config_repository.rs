use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::{PipelineError, PipelineResult, ProviderScope};
use pipeline_domain::{
    ProviderConfig, ProviderConfigRepository, ProviderKind, QuotaLimits, UsageCounters,
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use super::mapping::{get_optional_u64, get_u64, to_i64};

const SELECT_COLUMNS: &str = "SELECT id, name, kind, base_url, api_key, is_active, \
    per_hour, per_day, per_month, requests_this_hour, requests_today, requests_this_month, \
    hour_reset_at, day_reset_at, month_reset_at, last_reset_date, last_request_at, \
    created_at, updated_at FROM provider_configs";

pub struct SqliteProviderConfigRepository {
    pool: SqlitePool,
}

impl SqliteProviderConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_config(row: &SqliteRow) -> PipelineResult<ProviderConfig> {
        let kind: String = row.try_get("kind")?;
        Ok(ProviderConfig {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: kind.parse::<ProviderKind>()?,
            base_url: row.try_get("base_url")?,
            api_key: row.try_get("api_key")?,
            is_active: row.try_get("is_active")?,
            quota_limits: QuotaLimits {
                per_hour: get_optional_u64(row, "per_hour")?,
                per_day: get_optional_u64(row, "per_day")?,
                per_month: get_optional_u64(row, "per_month")?,
            },
            usage: UsageCounters {
                requests_this_hour: get_u64(row, "requests_this_hour")?,
                requests_today: get_u64(row, "requests_today")?,
                requests_this_month: get_u64(row, "requests_this_month")?,
                hour_reset_at: row.try_get("hour_reset_at")?,
                day_reset_at: row.try_get("day_reset_at")?,
                month_reset_at: row.try_get("month_reset_at")?,
                last_reset_date: row.try_get("last_reset_date")?,
                last_request_at: row.try_get("last_request_at")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn kind_for(scope: ProviderScope) -> ProviderKind {
        match scope {
            ProviderScope::Extraction => ProviderKind::Apify,
            ProviderScope::Generation => ProviderKind::Openai,
            ProviderScope::Publishing => ProviderKind::Facebook,
        }
    }
}

#[async_trait]
impl ProviderConfigRepository for SqliteProviderConfigRepository {
    #[instrument(skip(self, config), fields(config_id = %config.id))]
    async fn create(&self, config: &ProviderConfig) -> PipelineResult<ProviderConfig> {
        let usage = &config.usage;
        sqlx::query(
            r#"
            INSERT INTO provider_configs (id, name, kind, base_url, api_key, is_active,
                per_hour, per_day, per_month, requests_this_hour, requests_today, requests_this_month,
                hour_reset_at, day_reset_at, month_reset_at, last_reset_date, last_request_at,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.id)
        .bind(&config.name)
        .bind(config.kind.as_str())
        .bind(&config.base_url)
        .bind(&config.api_key)
        .bind(config.quota_limits.per_hour.map(to_i64))
        .bind(config.quota_limits.per_day.map(to_i64))
        .bind(config.quota_limits.per_month.map(to_i64))
        .bind(to_i64(usage.requests_this_hour))
        .bind(to_i64(usage.requests_today))
        .bind(to_i64(usage.requests_this_month))
        .bind(usage.hour_reset_at)
        .bind(usage.day_reset_at)
        .bind(usage.month_reset_at)
        .bind(usage.last_reset_date)
        .bind(usage.last_request_at)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("已创建提供方配置 {}", config.name);
        self.find_by_id(&config.id)
            .await?
            .ok_or_else(|| PipelineError::config_not_found(&config.id))
    }

    async fn find_by_id(&self, id: &str) -> PipelineResult<Option<ProviderConfig>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_config).transpose()
    }

    async fn find_all(&self) -> PipelineResult<Vec<ProviderConfig>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_config).collect()
    }

    async fn find_active(&self, scope: ProviderScope) -> PipelineResult<Option<ProviderConfig>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE kind = ? AND is_active = 1"))
            .bind(Self::kind_for(scope).as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_config).transpose()
    }

    async fn update(&self, config: &ProviderConfig) -> PipelineResult<ProviderConfig> {
        let result = sqlx::query(
            r#"
            UPDATE provider_configs
            SET name = ?, base_url = ?, api_key = ?, per_hour = ?, per_day = ?, per_month = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.name)
        .bind(&config.base_url)
        .bind(&config.api_key)
        .bind(config.quota_limits.per_hour.map(to_i64))
        .bind(config.quota_limits.per_day.map(to_i64))
        .bind(config.quota_limits.per_month.map(to_i64))
        .bind(config.updated_at)
        .bind(&config.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::config_not_found(&config.id));
        }
        self.find_by_id(&config.id)
            .await?
            .ok_or_else(|| PipelineError::config_not_found(&config.id))
    }

    async fn save_usage(&self, id: &str, usage: &UsageCounters) -> PipelineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE provider_configs
            SET requests_this_hour = ?, requests_today = ?, requests_this_month = ?,
                hour_reset_at = ?, day_reset_at = ?, month_reset_at = ?,
                last_reset_date = ?, last_request_at = ?
            WHERE id = ?
            "#,
        )
        .bind(to_i64(usage.requests_this_hour))
        .bind(to_i64(usage.requests_today))
        .bind(to_i64(usage.requests_this_month))
        .bind(usage.hour_reset_at)
        .bind(usage.day_reset_at)
        .bind(usage.month_reset_at)
        .bind(usage.last_reset_date)
        .bind(usage.last_request_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::config_not_found(id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn activate_exclusive(&self, id: &str) -> PipelineResult<ProviderConfig> {
        let mut tx = self.pool.begin().await?;

        let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM provider_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let kind = kind.ok_or_else(|| PipelineError::config_not_found(id))?;

        let now = Utc::now();
        // 先停用再激活，唯一索引在事务内任何时刻都不会被违反
        sqlx::query(
            "UPDATE provider_configs SET is_active = 0, updated_at = ? WHERE kind = ? AND id != ? AND is_active = 1",
        )
        .bind(now)
        .bind(&kind)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE provider_configs SET is_active = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| PipelineError::config_not_found(id))
    }

    async fn delete(&self, id: &str) -> PipelineResult<bool> {
        let result = sqlx::query("DELETE FROM provider_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
