//! In-process timer loop that drives the registered jobs.
//!
//! Jobs run as tokio tasks, in parallel across names but never two at once
//! for the same name. The scheduler holds no lock shared with other
//! processes: overlapping instances are safe because every job mutates the
//! store through conditional updates only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::jobs::{Job, JobReport};

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_HISTORY_LIMIT: usize = 200;

/// A job plus the cadence and time budget it runs with.
#[derive(Clone)]
pub struct JobSpec {
    pub name: String,
    pub cadence: Duration,
    pub timeout: Duration,
    pub handler: Arc<dyn Job>,
}

impl JobSpec {
    pub fn new(handler: Arc<dyn Job>, cadence: Duration, timeout: Duration) -> Self {
        Self {
            name: handler.name().to_string(),
            cadence,
            timeout,
            handler,
        }
    }
}

impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("cadence", &self.cadence)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed,
    TimedOut,
    /// Aborted because shutdown's grace period ran out
    Cancelled,
}

/// One finished invocation, kept in the scheduler's bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
    pub summary: String,
    pub report: Option<JobReport>,
}

#[derive(Debug, Clone)]
struct History {
    runs: Arc<Mutex<VecDeque<JobRun>>>,
    limit: usize,
}

impl History {
    fn new(limit: usize) -> Self {
        Self {
            runs: Arc::new(Mutex::new(VecDeque::new())),
            limit,
        }
    }

    fn push(&self, run: JobRun) {
        let mut runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        runs.push_back(run);
        while runs.len() > self.limit {
            runs.pop_front();
        }
    }

    fn snapshot(&self) -> Vec<JobRun> {
        let runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        runs.iter().cloned().collect()
    }
}

struct Entry {
    spec: JobSpec,
    cadence: chrono::Duration,
    /// `None` until the first launch, so every job runs on the first tick.
    next_run: Option<DateTime<Utc>>,
    running: Option<JoinHandle<()>>,
    /// Launch time of the current or last run
    launched_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    entries: Vec<Entry>,
    tick_interval: Duration,
    shutdown_grace: Duration,
    history: History,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Vec::new(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            history: History::new(DEFAULT_HISTORY_LIMIT),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(Duration::from_millis(1));
        self
    }

    /// How long shutdown waits for in-flight runs before aborting them.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.history.limit = max_entries.max(1);
        self
    }

    /// Add a job to the registry. Names must be unique.
    pub fn register(&mut self, spec: JobSpec) -> Result<(), CoreError> {
        if self.entries.iter().any(|entry| entry.spec.name == spec.name) {
            return Err(CoreError::Config(format!("job '{}' is already registered", spec.name)));
        }
        if spec.cadence.is_zero() || spec.timeout.is_zero() {
            return Err(CoreError::Config(format!(
                "job '{}' needs a non-zero cadence and timeout",
                spec.name
            )));
        }
        let cadence = chrono::Duration::from_std(spec.cadence)
            .map_err(|e| CoreError::Config(format!("cadence of job '{}' out of range: {}", spec.name, e)))?;

        debug!(job = %spec.name, cadence = ?spec.cadence, timeout = ?spec.timeout, "registered job");
        self.entries.push(Entry {
            spec,
            cadence,
            next_run: None,
            running: None,
            launched_at: None,
        });
        Ok(())
    }

    pub fn jobs(&self) -> Vec<&JobSpec> {
        self.entries.iter().map(|entry| &entry.spec).collect()
    }

    /// Launch every job that is due and not already running. Returns the
    /// names launched.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(&mut self) -> Vec<String> {
        let now = self.clock.now();
        let mut launched = Vec::new();

        for entry in &mut self.entries {
            if entry.next_run.is_some_and(|at| at > now) {
                continue;
            }
            if entry.is_running() {
                debug!(job = %entry.spec.name, "previous run still in flight, skipping");
                continue;
            }

            entry.next_run = Some(now + entry.cadence);
            entry.launched_at = Some(now);
            let run = execute(
                entry.spec.clone(),
                now,
                Arc::clone(&self.clock),
                self.history.clone(),
            );
            entry.running = Some(tokio::spawn(run));
            launched.push(entry.spec.name.clone());
        }

        launched
    }

    /// Names of jobs with a run in progress.
    pub fn in_flight(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.is_running())
            .map(|entry| entry.spec.name.clone())
            .collect()
    }

    /// Finished runs, oldest first.
    pub fn history(&self) -> Vec<JobRun> {
        self.history.snapshot()
    }

    /// Run the tick loop on a background task until [`SchedulerHandle::shutdown`].
    pub fn spawn(mut self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let history = self.history.clone();

        let join = tokio::spawn(async move {
            info!(jobs = self.entries.len(), tick = ?self.tick_interval, "scheduler started");
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.tick();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            self.drain().await;
            info!("scheduler stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            join,
            history,
        }
    }

    /// Wait up to the grace period for in-flight runs, then abort the rest.
    async fn drain(&mut self) {
        let deadline = tokio::time::Instant::now() + self.shutdown_grace;
        for entry in &mut self.entries {
            let Some(mut handle) = entry.running.take() else {
                continue;
            };
            if handle.is_finished() {
                continue;
            }
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(job = %entry.spec.name, "aborting run after shutdown grace period");
                handle.abort();
                let now = self.clock.now();
                self.history.push(JobRun {
                    job: entry.spec.name.clone(),
                    started_at: entry.launched_at.unwrap_or(now),
                    finished_at: now,
                    outcome: JobOutcome::Cancelled,
                    summary: "aborted at shutdown".to_string(),
                    report: None,
                });
            }
        }
    }
}

/// Aborts the wrapped run when dropped, whether by timeout or by shutdown.
struct RunGuard(JoinHandle<Result<JobReport, CoreError>>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn execute(spec: JobSpec, now: DateTime<Utc>, clock: Arc<dyn Clock>, history: History) {
    let started_at = clock.now();
    debug!(job = %spec.name, "job started");

    // The handler runs on its own task so a panic surfaces as a JoinError.
    let handler = Arc::clone(&spec.handler);
    let mut run = RunGuard(tokio::spawn(async move { handler.run(now).await }));

    let (outcome, summary, report) = match tokio::time::timeout(spec.timeout, &mut run.0).await {
        Ok(Ok(Ok(report))) => {
            info!(
                job = %spec.name,
                applied = report.applied,
                skipped = report.skipped,
                failed = report.failed,
                "job completed"
            );
            let summary = format!(
                "{} applied, {} skipped, {} failed",
                report.applied, report.skipped, report.failed
            );
            (JobOutcome::Completed, summary, Some(report))
        }
        Ok(Ok(Err(e))) => {
            if e.is_transient() {
                warn!(job = %spec.name, error = %e, "job failed, retrying next cadence");
            } else {
                error!(job = %spec.name, error = %e, "job failed");
            }
            (JobOutcome::Failed, e.to_string(), None)
        }
        Ok(Err(join_error)) => {
            error!(job = %spec.name, error = %join_error, "job panicked");
            (JobOutcome::Failed, format!("job panicked: {}", join_error), None)
        }
        Err(_) => {
            let e = CoreError::Timeout {
                job: spec.name.clone(),
                timeout: spec.timeout,
            };
            warn!(job = %spec.name, timeout = ?spec.timeout, "job timed out");
            (JobOutcome::TimedOut, e.to_string(), None)
        }
    };

    history.push(JobRun {
        job: spec.name,
        started_at,
        finished_at: clock.now(),
        outcome,
        summary,
        report,
    });
}

/// Control handle for a scheduler running in the background.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    history: History,
}

impl SchedulerHandle {
    pub fn history(&self) -> Vec<JobRun> {
        self.history.snapshot()
    }

    /// Stop ticking, let in-flight runs finish within the grace period, and
    /// wait for the loop to exit. Returns the final run history.
    pub async fn shutdown(self) -> Vec<JobRun> {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "scheduler loop ended abnormally");
        }
        self.history.snapshot()
    }
}
