use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::TaskStatus;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Transient: the job aborts this tick and is retried on its next cadence.
    #[error("Task store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// A conditional update matched no row because another writer acted first.
    #[error("Concurrent modification lost on {0}")]
    ConcurrentModificationLost(Uuid),

    #[error("Notifier failure: {0}")]
    NotifierFailure(String),

    #[error("Template {id} is invalid: {reason}")]
    TemplateInvalid { id: Uuid, reason: String },

    #[error("Task {id} is already {status} and cannot change status")]
    TerminalStateViolation { id: Uuid, status: TaskStatus },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job '{job}' exceeded its timeout of {timeout:?}")]
    Timeout { job: String, timeout: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous ID: {} candidates", .0.len())]
    AmbiguousId(Vec<(String, String)>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// True for errors that a later pass may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::StoreUnavailable(_)
                | CoreError::NotifierFailure(_)
                | CoreError::Timeout { .. }
                | CoreError::ConcurrentModificationLost(_)
        )
    }
}
