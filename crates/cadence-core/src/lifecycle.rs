//! Task status state machine.
//!
//! ```text
//! ongoing --(user)--------------> success
//! ongoing --(user | detector)---> failure
//! ```
//!
//! Success and failure are terminal. Every transition here is a conditional
//! update on `status = ongoing`; a request against a terminal task is refused
//! with [`CoreError::TerminalStateViolation`] instead of being applied.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Task, TaskChanges, TaskFilter, TaskStatus};
use crate::repository::TaskRepository;

/// Move a task out of `ongoing`.
pub async fn transition_status<R>(
    repo: &R,
    id: Uuid,
    target: TaskStatus,
    now: DateTime<Utc>,
) -> Result<Task, CoreError>
where
    R: TaskRepository + ?Sized,
{
    let task = load(repo, id).await?;
    if task.status.is_terminal() {
        return Err(CoreError::TerminalStateViolation { id, status: task.status });
    }

    let changes = match target {
        TaskStatus::Ongoing => {
            return Err(CoreError::InvalidInput(format!("task {} is already ongoing", id)));
        }
        TaskStatus::Success => {
            let actual = task.started_at.map(|started| (now - started).num_minutes().max(0));
            TaskChanges::at(now).status(TaskStatus::Success).completed(now, actual)
        }
        TaskStatus::Failure => TaskChanges::at(now).status(TaskStatus::Failure),
    };

    apply(repo, id, &changes).await
}

/// Mark a task as successfully completed.
pub async fn complete_task<R>(repo: &R, id: Uuid, now: DateTime<Utc>) -> Result<Task, CoreError>
where
    R: TaskRepository + ?Sized,
{
    transition_status(repo, id, TaskStatus::Success, now).await
}

pub async fn fail_task<R>(repo: &R, id: Uuid, now: DateTime<Utc>) -> Result<Task, CoreError>
where
    R: TaskRepository + ?Sized,
{
    transition_status(repo, id, TaskStatus::Failure, now).await
}

/// Record that work on the task began. Only ongoing tasks can be started.
pub async fn start_task<R>(repo: &R, id: Uuid, now: DateTime<Utc>) -> Result<Task, CoreError>
where
    R: TaskRepository + ?Sized,
{
    let task = load(repo, id).await?;
    if task.status.is_terminal() {
        return Err(CoreError::TerminalStateViolation { id, status: task.status });
    }
    apply(repo, id, &TaskChanges::at(now).started(now)).await
}

async fn load<R>(repo: &R, id: Uuid) -> Result<Task, CoreError>
where
    R: TaskRepository + ?Sized,
{
    repo.find_task_by_id(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("task {}", id)))
}

async fn apply<R>(repo: &R, id: Uuid, changes: &TaskChanges) -> Result<Task, CoreError>
where
    R: TaskRepository + ?Sized,
{
    if repo.conditional_update(id, &TaskFilter::ongoing(), changes).await? {
        return load(repo, id).await;
    }

    // Lost the race: report what the winner left behind.
    let current = load(repo, id).await?;
    debug!(task_id = %id, status = %current.status, "status transition lost to a concurrent writer");
    if current.status.is_terminal() {
        Err(CoreError::TerminalStateViolation { id, status: current.status })
    } else {
        Err(CoreError::ConcurrentModificationLost(id))
    }
}
