use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

pub const MIN_PRIORITY: i64 = 1;
pub const MAX_PRIORITY: i64 = 5;
pub const DEFAULT_PRIORITY: i64 = 3;
/// Minutes.
pub const DEFAULT_ESTIMATED_DURATION: i64 = 60;
/// Minutes in a leap year.
pub const MAX_ESTIMATED_DURATION: i64 = 366 * 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ongoing,
    Success,
    Failure,
}

impl TaskStatus {
    /// Success and failure accept no further status change.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Ongoing => "ongoing",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task status: {0}")]
pub struct ParseTaskStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ongoing" => Ok(TaskStatus::Ongoing),
            "success" => Ok(TaskStatus::Success),
            "failure" => Ok(TaskStatus::Failure),
            _ => Err(ParseTaskStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrencePattern {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrencePattern::None => "none",
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
        }
    }

    pub fn is_recurring(self) -> bool {
        !matches!(self, RecurrencePattern::None)
    }
}

impl std::fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid recurrence pattern: {0}")]
pub struct ParseRecurrencePatternError(String);

impl FromStr for RecurrencePattern {
    type Err = ParseRecurrencePatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(RecurrencePattern::None),
            "daily" => Ok(RecurrencePattern::Daily),
            "weekly" => Ok(RecurrencePattern::Weekly),
            "monthly" => Ok(RecurrencePattern::Monthly),
            _ => Err(ParseRecurrencePatternError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub status: TaskStatus,
    /// 1 (lowest) to 5 (highest)
    pub priority: i64,
    /// Minutes
    pub estimated_duration: i64,
    /// Minutes, filled in on completion when the task was started
    pub actual_duration: Option<i64>,
    pub tags: Json<BTreeSet<String>>,
    /// Reminder recipient
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurrence_pattern: RecurrencePattern,
    /// Weak reference to the template this task was generated from
    pub template_id: Option<Uuid>,
    pub last_reminder_sent_at: Option<DateTime<Utc>>,
    /// Lead time in seconds of the most urgent reminder threshold already signaled
    pub last_reminder_threshold: Option<i64>,
}

impl Task {
    pub fn time_until_deadline(&self, now: DateTime<Utc>) -> Duration {
        self.deadline - now
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Ongoing && self.deadline < now
    }

    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}

/// A recurring template. The pattern is kept as stored text and parsed per
/// template so one bad row cannot poison a whole generator pass.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurrenceTemplate {
    pub id: Uuid,
    pub name: String,
    pub title: String,
    pub description: String,
    pub priority: i64,
    pub estimated_duration: i64,
    pub tags: Json<BTreeSet<String>>,
    pub owner: Option<String>,
    pub recurrence_pattern: String,
    /// IANA timezone the calendar arithmetic runs in
    pub timezone: String,
    pub next_due_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrenceTemplate {
    /// Parses the stored pattern. `none` is rejected since it cannot advance.
    pub fn pattern(&self) -> Result<RecurrencePattern, CoreError> {
        let pattern = self
            .recurrence_pattern
            .parse::<RecurrencePattern>()
            .map_err(|e| CoreError::TemplateInvalid {
                id: self.id,
                reason: e.to_string(),
            })?;
        if !pattern.is_recurring() {
            return Err(CoreError::TemplateInvalid {
                id: self.id,
                reason: "recurrence pattern 'none' never advances".to_string(),
            });
        }
        Ok(pattern)
    }
}

#[derive(Debug, Clone)]
pub struct NewTaskData {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub priority: i64,
    pub estimated_duration: i64,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub recurrence_pattern: RecurrencePattern,
    pub template_id: Option<Uuid>,
}

impl NewTaskData {
    pub fn new(title: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            deadline,
            priority: DEFAULT_PRIORITY,
            estimated_duration: DEFAULT_ESTIMATED_DURATION,
            tags: Vec::new(),
            owner: None,
            recurrence_pattern: RecurrencePattern::None,
            template_id: None,
        }
    }

    /// Builds the task instance for the period starting at `period_start`.
    ///
    /// The deadline is the period start plus the template's estimated duration.
    /// Required fields are validated here so a malformed template is reported
    /// as [`CoreError::TemplateInvalid`] before anything is written.
    pub fn from_template(
        template: &RecurrenceTemplate,
        period_start: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let pattern = template.pattern()?;
        let deadline = Duration::try_minutes(template.estimated_duration)
            .and_then(|estimate| period_start.checked_add_signed(estimate))
            .ok_or_else(|| CoreError::TemplateInvalid {
                id: template.id,
                reason: format!(
                    "estimated duration of {} minutes is out of range",
                    template.estimated_duration
                ),
            })?;
        let data = Self {
            title: template.title.clone(),
            description: template.description.clone(),
            deadline,
            priority: template.priority,
            estimated_duration: template.estimated_duration,
            tags: template.tags.iter().cloned().collect(),
            owner: template.owner.clone(),
            recurrence_pattern: pattern,
            template_id: Some(template.id),
        };
        data.validate().map_err(|e| CoreError::TemplateInvalid {
            id: template.id,
            reason: e.to_string(),
        })?;
        Ok(data)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_fields(&self.title, self.priority, self.estimated_duration)
    }
}

fn validate_fields(title: &str, priority: i64, estimated_duration: i64) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::InvalidInput("title must not be empty".to_string()));
    }
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(CoreError::InvalidInput(format!(
            "priority {} outside {}..={}",
            priority, MIN_PRIORITY, MAX_PRIORITY
        )));
    }
    validate_estimated_duration(estimated_duration)
}

pub(crate) fn validate_estimated_duration(estimated_duration: i64) -> Result<(), CoreError> {
    if !(1..=MAX_ESTIMATED_DURATION).contains(&estimated_duration) {
        return Err(CoreError::InvalidInput(format!(
            "estimated duration must be between 1 and {} minutes, got {}",
            MAX_ESTIMATED_DURATION, estimated_duration
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewTemplateData {
    pub name: String,
    pub title: String,
    pub description: String,
    pub priority: i64,
    pub estimated_duration: i64,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub recurrence_pattern: RecurrencePattern,
    pub timezone: String,
    pub next_due_at: DateTime<Utc>,
}

impl NewTemplateData {
    pub fn new(
        name: impl Into<String>,
        recurrence_pattern: RecurrencePattern,
        next_due_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            description: String::new(),
            priority: DEFAULT_PRIORITY,
            estimated_duration: DEFAULT_ESTIMATED_DURATION,
            tags: Vec::new(),
            owner: None,
            recurrence_pattern,
            timezone: "UTC".to_string(),
            next_due_at,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_fields(&self.title, self.priority, self.estimated_duration)?;
        if !self.recurrence_pattern.is_recurring() {
            return Err(CoreError::InvalidInput(
                "a template needs a daily, weekly or monthly pattern".to_string(),
            ));
        }
        crate::timezone::validate_timezone(&self.timezone)
    }
}

/// User edit of a template. Every field is optional; `None` leaves it as is.
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub estimated_duration: Option<i64>,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub timezone: Option<String>,
    /// Only accepted when not earlier than the current value
    pub next_due_at: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl TemplateUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.estimated_duration.is_none()
            && self.recurrence_pattern.is_none()
            && self.timezone.is_none()
            && self.next_due_at.is_none()
            && self.active.is_none()
    }
}

/// Field predicates over tasks.
///
/// Used both to select rows for reading and as the expected-fields half of a
/// conditional update: a row only changes if it still matches the filter at
/// the moment the update executes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Empty matches any status
    pub status_in: Vec<TaskStatus>,
    pub deadline_before: Option<DateTime<Utc>>,
    pub deadline_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub template_id: Option<Uuid>,
    /// `Some(None)` requires that no reminder has been recorded yet
    pub reminder_threshold: Option<Option<i64>>,
    pub limit: Option<i64>,
}

impl TaskFilter {
    pub fn ongoing() -> Self {
        Self {
            status_in: vec![TaskStatus::Ongoing],
            ..Default::default()
        }
    }

    pub fn terminal() -> Self {
        Self {
            status_in: vec![TaskStatus::Success, TaskStatus::Failure],
            ..Default::default()
        }
    }

    pub fn deadline_before(mut self, at: DateTime<Utc>) -> Self {
        self.deadline_before = Some(at);
        self
    }

    pub fn deadline_after(mut self, at: DateTime<Utc>) -> Self {
        self.deadline_after = Some(at);
        self
    }

    pub fn updated_before(mut self, at: DateTime<Utc>) -> Self {
        self.updated_before = Some(at);
        self
    }

    pub fn template(mut self, template_id: Uuid) -> Self {
        self.template_id = Some(template_id);
        self
    }

    pub fn reminder_threshold(mut self, threshold: Option<i64>) -> Self {
        self.reminder_threshold = Some(threshold);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// New field values for a conditional task update.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskChanges {
    pub status: Option<TaskStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_duration: Option<i64>,
    pub last_reminder_sent_at: Option<DateTime<Utc>>,
    pub last_reminder_threshold: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl TaskChanges {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            status: None,
            started_at: None,
            completed_at: None,
            actual_duration: None,
            last_reminder_sent_at: None,
            last_reminder_threshold: None,
            updated_at: now,
        }
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>, actual_duration: Option<i64>) -> Self {
        self.completed_at = Some(at);
        self.actual_duration = actual_duration;
        self
    }

    pub fn reminder(mut self, threshold_secs: i64, sent_at: DateTime<Utc>) -> Self {
        self.last_reminder_threshold = Some(threshold_secs);
        self.last_reminder_sent_at = Some(sent_at);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateFilter {
    pub active: Option<bool>,
    /// Templates whose `next_due_at` is at or before this instant
    pub due_at_or_before: Option<DateTime<Utc>>,
}

impl TemplateFilter {
    pub fn due(now: DateTime<Utc>) -> Self {
        Self {
            active: Some(true),
            due_at_or_before: Some(now),
        }
    }
}
