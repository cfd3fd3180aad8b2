use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline_core::{JobStatus, JobType, PipelineError, PipelineResult};
use pipeline_domain::{JobFilter, JobRepository, Page, PageRequest, PipelineJob};
use tokio::sync::RwLock;

/// 内存任务仓储
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<String, PipelineJob>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &PipelineJob) -> PipelineResult<PipelineJob> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: &str) -> PipelineResult<Option<PipelineJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update(&self, job: &PipelineJob) -> PipelineResult<PipelineJob> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(job.clone())
            }
            None => Err(PipelineError::job_not_found(&job.id)),
        }
    }

    async fn find_by_key(
        &self,
        job_type: JobType,
        source_entity_id: &str,
    ) -> PipelineResult<Vec<PipelineJob>> {
        let mut matched: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.job_type == job_type && j.source_entity_id == source_entity_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn list(&self, filter: &JobFilter, page: PageRequest) -> PipelineResult<Page<PipelineJob>> {
        let mut matched: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(Page {
            total: matched.len() as u64,
            items: page.slice(&matched),
        })
    }

    async fn find_pending(&self, offset: usize, limit: usize) -> PipelineResult<Vec<PipelineJob>> {
        let mut pending: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(pending.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_pending_by_type(&self, job_type: JobType) -> PipelineResult<Vec<PipelineJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.job_type == job_type && j.status == JobStatus::Pending)
            .cloned()
            .collect())
    }

    async fn delete_if_pending(&self, id: &str) -> PipelineResult<bool> {
        let mut jobs = self.jobs.write().await;
        if jobs.get(id).is_some_and(|j| j.status == JobStatus::Pending) {
            jobs.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn count_by_status(&self) -> PipelineResult<HashMap<JobStatus, u64>> {
        let mut counts = HashMap::new();
        for job in self.jobs.read().await.values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_pending_by_type(&self) -> PipelineResult<HashMap<JobType, u64>> {
        let mut counts = HashMap::new();
        for job in self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Pending)
        {
            *counts.entry(job.job_type).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
