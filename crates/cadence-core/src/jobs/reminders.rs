use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::normalize_thresholds;
use crate::error::CoreError;
use crate::jobs::{Job, JobKind, JobReport, PlannedChange};
use crate::models::{Task, TaskChanges, TaskFilter};
use crate::notifier::{Notifier, ReminderMessage};
use crate::repository::TaskRepository;

pub const DEFAULT_RECIPIENT: &str = "owner@localhost";

/// The most urgent threshold that `remaining` has crossed, in seconds, if it
/// is more urgent than the one already signaled.
///
/// `thresholds` may be in any order. A task with no `marker` has had nothing
/// sent yet.
pub fn due_threshold(
    remaining: chrono::Duration,
    thresholds: &[Duration],
    marker: Option<i64>,
) -> Option<i64> {
    if remaining < chrono::Duration::zero() {
        return None;
    }
    let crossed = thresholds
        .iter()
        .filter_map(|t| chrono::Duration::from_std(*t).ok())
        .filter(|lead| remaining <= *lead)
        .map(|lead| lead.num_seconds())
        .min()?;
    match marker {
        Some(sent) if crossed >= sent => None,
        _ => Some(crossed),
    }
}

/// Sends one notification per crossed threshold per task.
pub struct ReminderDispatcher<R: ?Sized, N: ?Sized> {
    repo: Arc<R>,
    notifier: Arc<N>,
    thresholds: Vec<Duration>,
    default_recipient: String,
}

impl<R, N> ReminderDispatcher<R, N>
where
    R: TaskRepository + ?Sized,
    N: Notifier + ?Sized,
{
    pub fn new(repo: Arc<R>, notifier: Arc<N>, thresholds: &[Duration]) -> Self {
        Self {
            repo,
            notifier,
            thresholds: normalize_thresholds(thresholds),
            default_recipient: DEFAULT_RECIPIENT.to_string(),
        }
    }

    /// Recipient for tasks that have no owner.
    pub fn with_default_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.default_recipient = recipient.into();
        self
    }

    fn recipient_for(&self, task: &Task) -> String {
        task.owner
            .clone()
            .unwrap_or_else(|| self.default_recipient.clone())
    }

    /// Tasks that are ongoing and within reach of the largest threshold,
    /// paired with the threshold each one should be reminded about.
    async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        thresholds: &[Duration],
    ) -> Result<Vec<(Task, i64)>, CoreError> {
        let Some(widest) = thresholds.iter().max() else {
            return Ok(Vec::new());
        };
        let horizon = chrono::Duration::from_std(*widest)
            .map_err(|e| CoreError::Config(format!("reminder threshold out of range: {}", e)))?;
        let window_end = now
            .checked_add_signed(horizon)
            .and_then(|end| end.checked_add_signed(chrono::Duration::seconds(1)))
            .ok_or_else(|| CoreError::Config("reminder threshold reaches past the calendar".to_string()))?;
        let filter = TaskFilter::ongoing()
            .deadline_after(now)
            .deadline_before(window_end);

        let tasks = self.repo.find_tasks(&filter).await?;
        Ok(tasks
            .into_iter()
            .filter_map(|task| {
                due_threshold(task.time_until_deadline(now), thresholds, task.last_reminder_threshold)
                    .map(|threshold| (task, threshold))
            })
            .collect())
    }

    /// Send the reminders due at `now` and record a marker for each one
    /// delivered.
    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
        thresholds: &[Duration],
    ) -> Result<JobReport, CoreError> {
        let due = self.due_reminders(now, thresholds).await?;

        let mut report = JobReport::new(JobKind::ReminderDispatcher.name());
        report.candidates = due.len();

        for (task, threshold) in due {
            let message = ReminderMessage::for_task(&task, self.recipient_for(&task), threshold, now);

            if let Err(e) = self.notifier.send(&message).await {
                // No marker is written, so the next pass tries again.
                warn!(task_id = %task.id, threshold_secs = threshold, error = %e, "reminder delivery failed");
                report.failed += 1;
                continue;
            }

            let expected = TaskFilter::ongoing().reminder_threshold(task.last_reminder_threshold);
            let changes = TaskChanges::at(now).reminder(threshold, now);
            if self.repo.conditional_update(task.id, &expected, &changes).await? {
                info!(
                    task_id = %task.id,
                    recipient = %message.recipient,
                    threshold_secs = threshold,
                    "reminder sent"
                );
                report.record(PlannedChange::new(task.id, message.payload.subject));
            } else {
                debug!(task_id = %task.id, threshold_secs = threshold, "reminder marker already advanced elsewhere");
                report.skipped += 1;
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl<R, N> Job for ReminderDispatcher<R, N>
where
    R: TaskRepository + ?Sized + 'static,
    N: Notifier + ?Sized + 'static,
{
    fn name(&self) -> &str {
        JobKind::ReminderDispatcher.name()
    }

    async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<PlannedChange>, CoreError> {
        let due = self.due_reminders(now, &self.thresholds).await?;
        Ok(due
            .into_iter()
            .map(|(task, threshold)| {
                let message = ReminderMessage::for_task(&task, self.recipient_for(&task), threshold, now);
                PlannedChange::new(
                    task.id,
                    format!("notify {}: {}", message.recipient, message.payload.subject),
                )
            })
            .collect())
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError> {
        self.dispatch_due(now, &self.thresholds).await
    }
}
