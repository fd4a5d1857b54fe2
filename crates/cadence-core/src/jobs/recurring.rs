use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::jobs::{Job, JobKind, JobReport, PlannedChange};
use crate::models::{NewTaskData, RecurrenceTemplate, TemplateFilter};
use crate::recurrence::Schedule;
use crate::repository::TemplateRepository;

/// One period to generate: move `next_due_at` from `observed` to `next` and
/// create `task` if that move wins.
#[derive(Debug, Clone)]
struct PeriodClaim {
    observed: DateTime<Utc>,
    next: DateTime<Utc>,
    task: NewTaskData,
}

/// Materializes task instances from due recurrence templates.
pub struct RecurringGenerator<R: ?Sized> {
    repo: Arc<R>,
    enable_catchup: bool,
    max_batch_size: usize,
}

impl<R> RecurringGenerator<R>
where
    R: TemplateRepository + ?Sized,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            enable_catchup: true,
            max_batch_size: 100,
        }
    }

    /// Generate every missed period (up to `max_batch_size` per template per
    /// pass) instead of only the most recent one.
    pub fn with_catchup(mut self, enable_catchup: bool, max_batch_size: usize) -> Self {
        self.enable_catchup = enable_catchup;
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Generate the tasks for every active template due at `now`.
    pub async fn generate_due(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError> {
        let templates = self.repo.find_templates(&TemplateFilter::due(now)).await?;

        let mut report = JobReport::new(JobKind::RecurringGenerator.name());
        report.candidates = templates.len();

        for template in templates {
            let claims = match self.claims_for(&template, now) {
                Ok(claims) => claims,
                Err(CoreError::TemplateInvalid { id, reason }) => {
                    warn!(template_id = %id, %reason, "skipping invalid recurrence template");
                    report.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            for claim in claims {
                let observed = claim.observed;
                let next = claim.next;
                match self.repo.claim_period(template.id, observed, next, claim.task).await? {
                    Some(task) => {
                        info!(
                            template_id = %template.id,
                            task_id = %task.id,
                            deadline = %task.deadline,
                            next_due_at = %next,
                            "generated recurring task"
                        );
                        report.record(PlannedChange::new(
                            task.id,
                            format!("create '{}' due {} from template '{}'", task.title, task.deadline.to_rfc3339(), template.name),
                        ));
                    }
                    None => {
                        // Another generator advanced the template first; any later
                        // claims from this read are stale as well.
                        debug!(template_id = %template.id, observed = %observed, "period already generated elsewhere");
                        report.skipped += 1;
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    /// The periods to claim for `template`, oldest first.
    fn claims_for(
        &self,
        template: &RecurrenceTemplate,
        now: DateTime<Utc>,
    ) -> Result<Vec<PeriodClaim>, CoreError> {
        let schedule = Schedule::for_template(template)?;
        let invalid = |e: CoreError| CoreError::TemplateInvalid {
            id: template.id,
            reason: e.to_string(),
        };

        if !self.enable_catchup {
            let Some((current, following)) = schedule
                .latest_due_period(template.next_due_at, now)
                .map_err(invalid)?
            else {
                return Ok(Vec::new());
            };
            return Ok(vec![PeriodClaim {
                observed: template.next_due_at,
                next: following,
                task: NewTaskData::from_template(template, current)?,
            }]);
        }

        let periods = schedule
            .due_periods(template.next_due_at, now, self.max_batch_size)
            .map_err(invalid)?;
        let mut claims = Vec::with_capacity(periods.len());
        for period in periods {
            claims.push(PeriodClaim {
                observed: period,
                next: schedule.advance(period).map_err(invalid)?,
                task: NewTaskData::from_template(template, period)?,
            });
        }
        Ok(claims)
    }
}

#[async_trait]
impl<R> Job for RecurringGenerator<R>
where
    R: TemplateRepository + ?Sized + 'static,
{
    fn name(&self) -> &str {
        JobKind::RecurringGenerator.name()
    }

    async fn plan(&self, now: DateTime<Utc>) -> Result<Vec<PlannedChange>, CoreError> {
        let templates = self.repo.find_templates(&TemplateFilter::due(now)).await?;
        let mut changes = Vec::new();
        for template in templates {
            match self.claims_for(&template, now) {
                Ok(claims) => changes.extend(claims.into_iter().map(|claim| {
                    PlannedChange::new(
                        template.id,
                        format!(
                            "create '{}' due {}; next_due_at {} -> {}",
                            claim.task.title,
                            claim.task.deadline.to_rfc3339(),
                            claim.observed.to_rfc3339(),
                            claim.next.to_rfc3339()
                        ),
                    )
                })),
                Err(CoreError::TemplateInvalid { id, reason }) => {
                    warn!(template_id = %id, %reason, "invalid recurrence template would be skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(changes)
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, CoreError> {
        self.generate_due(now).await
    }
}
