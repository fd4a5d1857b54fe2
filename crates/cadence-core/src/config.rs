//! Engine configuration shared by the scheduler and the jobs.
//!
//! Durations are expressed in whole seconds so they read naturally in TOML
//! and environment variables (`overdue_check_interval = 300`).

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::time::Duration;

use crate::error::CoreError;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Upper bound for every configured duration, roughly a century.
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 366 * DAY);

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cadence of the overdue detector
    #[serde_as(as = "DurationSeconds<u64>")]
    pub overdue_check_interval: Duration,
    /// Cadence of the recurring generator
    #[serde_as(as = "DurationSeconds<u64>")]
    pub generator_interval: Duration,
    /// Cadence of the reminder dispatcher
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reminder_interval: Duration,
    /// Cadence of the retention cleaner
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retention_interval: Duration,
    /// Lead times before a deadline at which a reminder fires
    #[serde_as(as = "Vec<DurationSeconds<u64>>")]
    pub reminder_thresholds: Vec<Duration>,
    /// Terminal tasks untouched for longer than this are purged
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retention_horizon: Duration,
    /// Upper bound on a single job invocation
    #[serde_as(as = "DurationSeconds<u64>")]
    pub job_timeout: Duration,
    /// How often the scheduler checks for due jobs
    #[serde_as(as = "DurationSeconds<u64>")]
    pub tick_interval: Duration,
    /// How long shutdown waits for in-flight runs
    #[serde_as(as = "DurationSeconds<u64>")]
    pub shutdown_grace: Duration,
    /// Generate one task per missed period instead of only the latest
    pub enable_catchup: bool,
    /// Limit for tasks generated per template in one pass
    pub max_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overdue_check_interval: Duration::from_secs(5 * MINUTE),
            generator_interval: Duration::from_secs(15 * MINUTE),
            reminder_interval: Duration::from_secs(5 * MINUTE),
            retention_interval: Duration::from_secs(DAY),
            reminder_thresholds: vec![
                Duration::from_secs(DAY),
                Duration::from_secs(6 * HOUR),
                Duration::from_secs(HOUR),
            ],
            retention_horizon: Duration::from_secs(30 * DAY),
            job_timeout: Duration::from_secs(MINUTE),
            tick_interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
            enable_catchup: true,
            max_batch_size: 100,
        }
    }
}

impl EngineConfig {
    /// Check the configuration before the scheduler starts.
    ///
    /// Every duration must be at most [`MAX_DURATION`], so date arithmetic in
    /// the jobs cannot overflow. On success the thresholds are sorted
    /// most-distant first and deduplicated.
    pub fn validate(mut self) -> Result<Self, CoreError> {
        let cadences = [
            ("overdue_check_interval", self.overdue_check_interval),
            ("generator_interval", self.generator_interval),
            ("reminder_interval", self.reminder_interval),
            ("retention_interval", self.retention_interval),
            ("job_timeout", self.job_timeout),
            ("tick_interval", self.tick_interval),
        ];
        for (name, value) in cadences {
            if value.is_zero() {
                return Err(CoreError::Config(format!("{} must be greater than zero", name)));
            }
        }

        let bounded = cadences
            .into_iter()
            .chain([
                ("retention_horizon", self.retention_horizon),
                ("shutdown_grace", self.shutdown_grace),
            ])
            .chain(self.reminder_thresholds.iter().map(|t| ("reminder_thresholds", *t)));
        for (name, value) in bounded {
            if value > MAX_DURATION {
                return Err(CoreError::Config(format!(
                    "{} of {}s exceeds the maximum of {}s",
                    name,
                    value.as_secs(),
                    MAX_DURATION.as_secs()
                )));
            }
        }
        if self.retention_horizon.is_zero() {
            return Err(CoreError::Config("retention_horizon must be greater than zero".to_string()));
        }
        if self.reminder_thresholds.iter().any(|t| t.is_zero()) {
            return Err(CoreError::Config("reminder_thresholds must all be greater than zero".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(CoreError::Config("max_batch_size must be at least 1".to_string()));
        }

        self.reminder_thresholds = normalize_thresholds(&self.reminder_thresholds);
        Ok(self)
    }
}

/// Sort thresholds from the most distant to the most urgent and drop duplicates.
pub fn normalize_thresholds(thresholds: &[Duration]) -> Vec<Duration> {
    let mut sorted = thresholds.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    sorted
}
