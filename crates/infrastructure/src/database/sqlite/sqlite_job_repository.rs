use std::collections::HashMap;

use async_trait::async_trait;
use pipeline_core::{JobStatus, JobType, PipelineError, PipelineResult};
use pipeline_domain::{JobFilter, JobRepository, Page, PageRequest, PipelineJob};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use super::mapping::{get_u32, get_u64, parse_json, parse_optional_json, to_i64};

const SELECT_COLUMNS: &str = "SELECT id, job_type, source_entity_id, related_config_id, status, \
    priority, progress, retry_count, max_retries, error, payload, result, version, \
    started_at, completed_at, created_at, updated_at FROM pipeline_jobs";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> PipelineResult<PipelineJob> {
        let job_type: String = row.try_get("job_type")?;
        let status: String = row.try_get("status")?;
        let progress = get_u32(row, "progress")?;
        Ok(PipelineJob {
            id: row.try_get("id")?,
            job_type: job_type.parse::<JobType>()?,
            source_entity_id: row.try_get("source_entity_id")?,
            related_config_id: row.try_get("related_config_id")?,
            status: status.parse::<JobStatus>()?,
            priority: row.try_get("priority")?,
            progress: u8::try_from(progress.min(100)).unwrap_or(100),
            retry_count: get_u32(row, "retry_count")?,
            max_retries: get_u32(row, "max_retries")?,
            error: row.try_get("error")?,
            payload: parse_json(row, "payload")?,
            result: parse_optional_json(row, "result")?,
            version: get_u64(row, "version")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &JobFilter) {
        let mut separator = " WHERE ";
        if let Some(job_type) = filter.job_type {
            builder.push(separator).push("job_type = ").push_bind(job_type.as_str());
            separator = " AND ";
        }
        if let Some(status) = filter.status {
            builder.push(separator).push("status = ").push_bind(status.as_str());
        }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    async fn create(&self, job: &PipelineJob) -> PipelineResult<PipelineJob> {
        let result_json = job.result.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_jobs (id, job_type, source_entity_id, related_config_id, status,
                priority, progress, retry_count, max_retries, error, payload, result, version,
                started_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.job_type.as_str())
        .bind(&job.source_entity_id)
        .bind(&job.related_config_id)
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(i64::from(job.progress))
        .bind(i64::from(job.retry_count))
        .bind(i64::from(job.max_retries))
        .bind(&job.error)
        .bind(serde_json::to_string(&job.payload)?)
        .bind(result_json)
        .bind(to_i64(job.version))
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("已创建任务 {}", job.id);
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: &str) -> PipelineResult<Option<PipelineJob>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn update(&self, job: &PipelineJob) -> PipelineResult<PipelineJob> {
        let result_json = job.result.as_ref().map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE pipeline_jobs
            SET status = ?, priority = ?, progress = ?, retry_count = ?, max_retries = ?,
                error = ?, payload = ?, result = ?, version = ?, started_at = ?, completed_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(i64::from(job.progress))
        .bind(i64::from(job.retry_count))
        .bind(i64::from(job.max_retries))
        .bind(&job.error)
        .bind(serde_json::to_string(&job.payload)?)
        .bind(result_json)
        .bind(to_i64(job.version))
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::job_not_found(&job.id));
        }
        Ok(job.clone())
    }

    async fn find_by_key(
        &self,
        job_type: JobType,
        source_entity_id: &str,
    ) -> PipelineResult<Vec<PipelineJob>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE job_type = ? AND source_entity_id = ? ORDER BY created_at"
        ))
        .bind(job_type.as_str())
        .bind(source_entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    async fn list(&self, filter: &JobFilter, page: PageRequest) -> PipelineResult<Page<PipelineJob>> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM pipeline_jobs");
        Self::push_filter(&mut count_query, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        Self::push_filter(&mut query, filter);
        query
            .push(" ORDER BY updated_at DESC LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = query.build().fetch_all(&self.pool).await?;

        Ok(Page {
            items: rows.iter().map(Self::row_to_job).collect::<PipelineResult<_>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn find_pending(&self, offset: usize, limit: usize) -> PipelineResult<Vec<PipelineJob>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY priority, created_at, id LIMIT ? OFFSET ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    async fn find_pending_by_type(&self, job_type: JobType) -> PipelineResult<Vec<PipelineJob>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE job_type = ? AND status = 'pending' ORDER BY created_at"
        ))
        .bind(job_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    async fn delete_if_pending(&self, id: &str) -> PipelineResult<bool> {
        let result = sqlx::query("DELETE FROM pipeline_jobs WHERE id = ? AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self) -> PipelineResult<HashMap<JobStatus, u64>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS total FROM pipeline_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = HashMap::new();
        for row in &rows {
            let status: String = row.try_get("status")?;
            counts.insert(status.parse::<JobStatus>()?, get_u64(row, "total")?);
        }
        Ok(counts)
    }

    async fn count_pending_by_type(&self) -> PipelineResult<HashMap<JobType, u64>> {
        let rows = sqlx::query(
            "SELECT job_type, COUNT(*) AS total FROM pipeline_jobs WHERE status = 'pending' GROUP BY job_type",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut counts = HashMap::new();
        for row in &rows {
            let job_type: String = row.try_get("job_type")?;
            counts.insert(job_type.parse::<JobType>()?, get_u64(row, "total")?);
        }
        Ok(counts)
    }
}
