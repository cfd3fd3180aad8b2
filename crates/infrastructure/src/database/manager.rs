use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use pipeline_core::config::models::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS provider_configs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        base_url TEXT NOT NULL,
        api_key TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 0,
        per_hour INTEGER,
        per_day INTEGER,
        per_month INTEGER,
        requests_this_hour INTEGER NOT NULL DEFAULT 0,
        requests_today INTEGER NOT NULL DEFAULT 0,
        requests_this_month INTEGER NOT NULL DEFAULT 0,
        hour_reset_at TEXT NOT NULL,
        day_reset_at TEXT NOT NULL,
        month_reset_at TEXT NOT NULL,
        last_reset_date TEXT,
        last_request_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    // 每个提供方类型（即作用域）最多一个激活配置
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_provider_configs_one_active ON provider_configs(kind) WHERE is_active = 1",
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_jobs (
        id TEXT PRIMARY KEY,
        job_type TEXT NOT NULL,
        source_entity_id TEXT NOT NULL,
        related_config_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        priority INTEGER NOT NULL DEFAULT 5,
        progress INTEGER NOT NULL DEFAULT 0,
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 3,
        error TEXT,
        payload TEXT NOT NULL DEFAULT '{}',
        result TEXT,
        version INTEGER NOT NULL DEFAULT 1,
        started_at TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    // 同一个 (job_type, source_entity_id) 最多一个处理中的任务
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_pipeline_jobs_one_processing ON pipeline_jobs(job_type, source_entity_id) WHERE status = 'processing'",
    "CREATE INDEX IF NOT EXISTS idx_pipeline_jobs_key ON pipeline_jobs(job_type, source_entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_pipeline_jobs_pending ON pipeline_jobs(status, priority, created_at)",
];

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("无效的SQLite连接串: {}", config.url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // 内存库每个连接都是独立的数据库，只能用单连接且不能回收
        let in_memory = config.url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .context("连接SQLite数据库失败")?;

        info!("已连接SQLite数据库: {}", config.url);
        Ok(Self { pool })
    }

    /// 单连接内存库，供测试使用
    pub async fn in_memory() -> Result<Self> {
        let manager = Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await?;
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        debug!("执行SQLite数据库迁移");
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("执行数据库迁移失败")?;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
