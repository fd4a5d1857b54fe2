//! Builds the job registry from an [`EngineConfig`].

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::jobs::reminders::DEFAULT_RECIPIENT;
use crate::jobs::{Job, JobKind, OverdueDetector, RecurringGenerator, ReminderDispatcher, RetentionCleaner};
use crate::notifier::Notifier;
use crate::repository::Repository;
use crate::scheduler::{JobSpec, Scheduler};

/// The four built-in jobs bound to one store and one notifier.
#[derive(Clone)]
pub struct Engine {
    repo: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    default_recipient: String,
}

impl Engine {
    /// Fails with [`CoreError::Config`] if `config` does not validate.
    pub fn new(
        repo: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            repo,
            notifier,
            config: config.validate()?,
            default_recipient: DEFAULT_RECIPIENT.to_string(),
        })
    }

    pub fn with_default_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.default_recipient = recipient.into();
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn job(&self, kind: JobKind) -> Arc<dyn Job> {
        match kind {
            JobKind::OverdueDetector => Arc::new(OverdueDetector::new(Arc::clone(&self.repo))),
            JobKind::RecurringGenerator => Arc::new(
                RecurringGenerator::new(Arc::clone(&self.repo))
                    .with_catchup(self.config.enable_catchup, self.config.max_batch_size),
            ),
            JobKind::ReminderDispatcher => Arc::new(
                ReminderDispatcher::new(
                    Arc::clone(&self.repo),
                    Arc::clone(&self.notifier),
                    &self.config.reminder_thresholds,
                )
                .with_default_recipient(self.default_recipient.clone()),
            ),
            JobKind::RetentionCleaner => Arc::new(RetentionCleaner::new(
                Arc::clone(&self.repo),
                self.config.retention_horizon,
            )),
        }
    }

    pub fn cadence(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::OverdueDetector => self.config.overdue_check_interval,
            JobKind::RecurringGenerator => self.config.generator_interval,
            JobKind::ReminderDispatcher => self.config.reminder_interval,
            JobKind::RetentionCleaner => self.config.retention_interval,
        }
    }

    /// The registry in fixed order.
    pub fn job_specs(&self) -> Vec<JobSpec> {
        JobKind::ALL
            .into_iter()
            .map(|kind| JobSpec::new(self.job(kind), self.cadence(kind), self.config.job_timeout))
            .collect()
    }

    pub fn scheduler(&self, clock: Arc<dyn Clock>) -> Result<Scheduler, CoreError> {
        let mut scheduler = Scheduler::new(clock)
            .with_tick_interval(self.config.tick_interval)
            .with_shutdown_grace(self.config.shutdown_grace);
        for spec in self.job_specs() {
            scheduler.register(spec)?;
        }
        Ok(scheduler)
    }
}
