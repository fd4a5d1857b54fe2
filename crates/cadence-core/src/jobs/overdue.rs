use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::jobs::{Job, JobKind, JobReport, PlannedChange};
use crate::models::{Task, TaskChanges, TaskFilter, TaskStatus};
use crate::repository::TaskRepository;

/// Moves ongoing tasks whose deadline has passed to `failure`.
pub struct OverdueDetector<R: ?Sized> {
    repo: Arc<R>,
}

impl<R> OverdueDetector<R>
where
    R: TaskRepository + ?Sized,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Run one pass and return how many tasks this call transitioned.
    ///
    /// Calling it again with the same `now` transitions nothing.
    pub async fn check_and_mark(&self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        Ok(self.mark_overdue(now).await?.applied)
    }

    fn filter(now: DateTime<Utc>) -> TaskFilter {
        TaskFilter::ongoing().deadline_before(now)
    }

    fn describe(task: &Task) -> String {
        format!("mark '{}' failed (deadline {})", task.title, task.deadline.to_rfc3339())
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError> {
        let filter = Self::filter(now);
        let candidates = self.repo.find_tasks(&filter).await?;

        let mut report = JobReport::new(JobKind::OverdueDetector.name());
        report.candidates = candidates.len();

        let changes = TaskChanges::at(now).status(TaskStatus::Failure);
        for task in candidates {
            // The filter is re-checked by the update itself, so a task completed
            // since the read above is left alone.
            if self.repo.conditional_update(task.id, &filter, &changes).await? {
                info!(task_id = %task.id, title = %task.title, deadline = %task.deadline, "task marked as failed");
                report.record(PlannedChange::new(task.id, Self::describe(&task)));
            } else {
                debug!(task_id = %task.id, "overdue transition already applied elsewhere");
                report.skipped += 1;
            }
        }

        if report.applied > 0 {
            info!(count = report.applied, "marked overdue tasks as failed");
        }
        Ok(report)
    }
}

#[async_trait]
impl<R> Job for OverdueDetector<R>
where
    R: TaskRepository + ?Sized + 'static,
{
    fn name(&self) -> &str {
        JobKind::OverdueDetector.name()
    }

    async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<PlannedChange>, CoreError> {
        let candidates = self.repo.find_tasks(&Self::filter(now)).await?;
        Ok(candidates
            .iter()
            .map(|task| PlannedChange::new(task.id, Self::describe(task)))
            .collect())
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError> {
        self.mark_overdue(now).await
    }
}
