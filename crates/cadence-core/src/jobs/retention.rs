use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::jobs::{Job, JobKind, JobReport, PlannedChange};
use crate::models::TaskFilter;
use crate::repository::TaskRepository;

/// Deletes terminal tasks that have not been touched within the horizon.
pub struct RetentionCleaner<R: ?Sized> {
    repo: Arc<R>,
    horizon: Duration,
}

impl<R> RetentionCleaner<R>
where
    R: TaskRepository + ?Sized,
{
    pub fn new(repo: Arc<R>, horizon: Duration) -> Self {
        Self { repo, horizon }
    }

    fn filter(now: DateTime<Utc>, horizon: Duration) -> Result<TaskFilter, CoreError> {
        let horizon = chrono::Duration::from_std(horizon)
            .map_err(|e| CoreError::Config(format!("retention_horizon out of range: {}", e)))?;
        let cutoff = now
            .checked_sub_signed(horizon)
            .ok_or_else(|| CoreError::Config("retention_horizon reaches past the calendar".to_string()))?;
        Ok(TaskFilter::terminal().updated_before(cutoff))
    }

    /// Delete every success/failure task last updated before `now - horizon`.
    pub async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<JobReport, CoreError> {
        let filter = Self::filter(now, horizon)?;
        let candidates = self.repo.find_tasks(&filter).await?;

        let mut report = JobReport::new(JobKind::RetentionCleaner.name());
        report.candidates = candidates.len();

        for task in candidates {
            if self.repo.delete_task_if(task.id, &filter).await? {
                debug!(task_id = %task.id, status = %task.status, "purged task");
                report.record(PlannedChange::new(
                    task.id,
                    format!("delete '{}' ({}, updated {})", task.title, task.status, task.updated_at.to_rfc3339()),
                ));
            } else {
                report.skipped += 1;
            }
        }

        if report.applied > 0 {
            info!(count = report.applied, "purged expired tasks");
        }
        Ok(report)
    }
}

#[async_trait]
impl<R> Job for RetentionCleaner<R>
where
    R: TaskRepository + ?Sized + 'static,
{
    fn name(&self) -> &str {
        JobKind::RetentionCleaner.name()
    }

    async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<PlannedChange>, CoreError> {
        let candidates = self.repo.find_tasks(&Self::filter(now, self.horizon)?).await?;
        Ok(candidates
            .iter()
            .map(|task| {
                PlannedChange::new(
                    task.id,
                    format!("delete '{}' ({}, updated {})", task.title, task.status, task.updated_at.to_rfc3339()),
                )
            })
            .collect())
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError> {
        self.purge_expired(now, self.horizon).await
    }
}
