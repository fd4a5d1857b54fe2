//! The periodic jobs that move task state without user action.
//!
//! Each job reads candidates, then applies one conditional update per
//! candidate. A lost compare-and-swap is counted as `skipped`, never as an
//! error: it only means another process already did the work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

pub mod overdue;
pub mod recurring;
pub mod reminders;
pub mod retention;

pub use overdue::OverdueDetector;
pub use recurring::RecurringGenerator;
pub use reminders::ReminderDispatcher;
pub use retention::RetentionCleaner;

/// The built-in jobs, in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobKind {
    OverdueDetector,
    RecurringGenerator,
    ReminderDispatcher,
    RetentionCleaner,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::OverdueDetector,
        JobKind::RecurringGenerator,
        JobKind::ReminderDispatcher,
        JobKind::RetentionCleaner,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::OverdueDetector => "overdue-detector",
            JobKind::RecurringGenerator => "recurring-generator",
            JobKind::ReminderDispatcher => "reminder-dispatcher",
            JobKind::RetentionCleaner => "retention-cleaner",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Unknown job: {0}")]
pub struct ParseJobKindError(String);

impl FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s.to_lowercase())
            .ok_or_else(|| ParseJobKindError(s.to_string()))
    }
}

/// One mutation a job applied, or would apply in a dry run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChange {
    /// The task or template affected
    pub subject_id: Uuid,
    pub description: String,
}

impl PlannedChange {
    pub fn new(subject_id: Uuid, description: impl Into<String>) -> Self {
        Self {
            subject_id,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobReport {
    pub job: String,
    pub dry_run: bool,
    /// Rows the pass looked at
    pub candidates: usize,
    /// Mutations committed
    pub applied: usize,
    /// Lost races, nothing to do
    pub skipped: usize,
    /// Per-item failures that did not abort the pass
    pub failed: usize,
    pub changes: Vec<PlannedChange>,
}

impl JobReport {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            ..Default::default()
        }
    }

    /// Report for a dry run: every planned change is a candidate, nothing applied.
    pub fn planned(job: impl Into<String>, changes: Vec<PlannedChange>) -> Self {
        Self {
            job: job.into(),
            dry_run: true,
            candidates: changes.len(),
            changes,
            ..Default::default()
        }
    }

    pub fn record(&mut self, change: PlannedChange) {
        self.applied += 1;
        self.changes.push(change);
    }
}

/// A unit of periodic work the scheduler can invoke.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Compute the mutations a pass at `now` would make, without committing.
    async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<PlannedChange>, CoreError>;

    /// Run one pass at `now`.
    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError>;

    async fn dry_run(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError> {
        let changes = self.plan(now).await?;
        Ok(JobReport::planned(self.name(), changes))
    }
}
