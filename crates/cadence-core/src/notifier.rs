//! Reminder delivery contract.
//!
//! The dispatcher only knows [`Notifier`]; transport lives behind it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::Task;

/// Which message layout to use, chosen by how close the deadline is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderTemplate {
    /// One hour or less remaining
    Urgent,
    /// Six hours or less remaining
    Soon,
    Upcoming,
}

impl ReminderTemplate {
    pub fn for_remaining(remaining: Duration) -> Self {
        if remaining <= Duration::hours(1) {
            ReminderTemplate::Urgent
        } else if remaining <= Duration::hours(6) {
            ReminderTemplate::Soon
        } else {
            ReminderTemplate::Upcoming
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderPayload {
    pub task_id: Uuid,
    pub subject: String,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub priority: i64,
    /// The threshold that was crossed, in seconds before the deadline
    pub threshold_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderMessage {
    pub recipient: String,
    pub template: ReminderTemplate,
    pub payload: ReminderPayload,
}

impl ReminderMessage {
    pub fn for_task(
        task: &Task,
        recipient: impl Into<String>,
        threshold_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let remaining = task.time_until_deadline(now);
        let template = ReminderTemplate::for_remaining(remaining);
        let subject = match template {
            ReminderTemplate::Urgent => format!(
                "URGENT: Task '{}' is due in {} minutes!",
                task.title,
                remaining.num_minutes().max(0)
            ),
            ReminderTemplate::Soon => {
                format!("Task '{}' is due in {} hours", task.title, remaining.num_hours())
            }
            ReminderTemplate::Upcoming if remaining <= Duration::days(1) => {
                format!("Reminder: Task '{}' is due tomorrow", task.title)
            }
            ReminderTemplate::Upcoming => {
                format!("Reminder: Task '{}' is due in {} days", task.title, remaining.num_days())
            }
        };
        Self {
            recipient: recipient.into(),
            template,
            payload: ReminderPayload {
                task_id: task.id,
                subject,
                title: task.title.clone(),
                description: task.description.clone(),
                deadline: task.deadline,
                priority: task.priority,
                threshold_secs,
            },
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Any error means nothing was delivered.
    async fn send(&self, message: &ReminderMessage) -> Result<(), CoreError>;
}

/// Emits reminders as log events. Useful when no relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &ReminderMessage) -> Result<(), CoreError> {
        info!(
            recipient = %message.recipient,
            task_id = %message.payload.task_id,
            template = ?message.template,
            "{}",
            message.payload.subject
        );
        Ok(())
    }
}

/// Appends one JSON line per message to a file that an external relay drains.
#[derive(Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
    // Serializes appends so lines from concurrent sends never interleave.
    lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, message: &ReminderMessage) -> Result<(), CoreError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| CoreError::NotifierFailure(format!("cannot encode message: {e}")))?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CoreError::NotifierFailure(format!("cannot open {}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CoreError::NotifierFailure(format!("cannot write {}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| CoreError::NotifierFailure(format!("cannot flush {}: {e}", self.path.display())))?;
        Ok(())
    }
}
