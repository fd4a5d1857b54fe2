//! Calendar arithmetic for recurrence templates.
//!
//! Periods advance in the template's own timezone so that a daily template
//! keeps its wall-clock time across DST changes and a monthly template moves
//! by calendar months rather than a fixed number of hours.

use chrono::{DateTime, Days, Months, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;
use crate::models::{RecurrencePattern, RecurrenceTemplate};
use crate::timezone::{parse_timezone, resolve_local};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pattern: RecurrencePattern,
    timezone: Tz,
}

impl Schedule {
    pub fn new(pattern: RecurrencePattern, timezone: &str) -> Result<Self, CoreError> {
        if !pattern.is_recurring() {
            return Err(CoreError::InvalidInput(
                "recurrence pattern 'none' never advances".to_string(),
            ));
        }
        Ok(Self {
            pattern,
            timezone: parse_timezone(timezone)?,
        })
    }

    /// Schedule for a stored template; any parse failure is `TemplateInvalid`.
    pub fn for_template(template: &RecurrenceTemplate) -> Result<Self, CoreError> {
        let pattern = template.pattern()?;
        let timezone = parse_timezone(&template.timezone).map_err(|e| CoreError::TemplateInvalid {
            id: template.id,
            reason: e.to_string(),
        })?;
        Ok(Self { pattern, timezone })
    }

    pub fn pattern(&self) -> RecurrencePattern {
        self.pattern
    }

    /// The period start one calendar unit after `from`.
    ///
    /// Monthly steps clamp to the end of shorter months (Jan 31 -> Feb 28).
    /// Each step starts from the previous period and no anchor day is kept,
    /// so a clamped day stays clamped (Feb 28 -> Mar 28). Likewise a wall
    /// time pushed forward by a DST gap carries into later periods.
    pub fn advance(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>, CoreError> {
        let local = from.with_timezone(&self.timezone).naive_local();
        let next_local = match self.pattern {
            RecurrencePattern::Daily => local.checked_add_days(Days::new(1)),
            RecurrencePattern::Weekly => local.checked_add_days(Days::new(7)),
            RecurrencePattern::Monthly => local.checked_add_months(Months::new(1)),
            RecurrencePattern::None => None,
        }
        .ok_or_else(|| CoreError::InvalidInput(format!("cannot advance {} from {}", self.pattern, from)))?;

        let next = resolve_local(&self.timezone, next_local)
            .ok_or_else(|| CoreError::InvalidInput(format!("no valid instant for {}", next_local)))?;

        if next <= from {
            return Err(CoreError::InvalidInput(format!(
                "{} advance from {} did not move forward",
                self.pattern, from
            )));
        }
        Ok(next)
    }

    /// Period starts in `[next_due, now]`, oldest first, at most `limit` of them.
    pub fn due_periods(
        &self,
        next_due: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DateTime<Utc>>, CoreError> {
        let mut periods = Vec::new();
        let mut cursor = next_due;
        while cursor <= now && periods.len() < limit {
            periods.push(cursor);
            cursor = self.advance(cursor)?;
        }
        Ok(periods)
    }

    /// The most recent period start at or before `now` and the first one after it.
    ///
    /// Returns `None` when `next_due` is still in the future.
    pub fn latest_due_period(
        &self,
        next_due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, CoreError> {
        if next_due > now {
            return Ok(None);
        }
        let mut current = next_due;
        let mut following = self.advance(current)?;
        while following <= now {
            current = following;
            following = self.advance(current)?;
        }
        Ok(Some((current, following)))
    }
}
