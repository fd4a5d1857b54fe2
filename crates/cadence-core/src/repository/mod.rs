use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    NewTaskData, NewTemplateData, RecurrenceTemplate, Task, TaskChanges, TaskFilter,
    TemplateFilter, TemplateUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// Re-export domain modules
pub mod tasks;
pub mod templates;
pub mod query_builder;

// Traits are defined in this module and implemented in respective domain modules.
//
// Every mutation that automation performs is conditional: the caller states the
// field values it observed and the row only changes if they still hold when the
// statement executes. A `false` return means another writer got there first.

/// Domain-specific trait for task storage
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create_task(&self, data: NewTaskData) -> Result<Task, CoreError>;
    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError>;
    /// Tasks whose id (hex, without dashes) starts with `short_id`.
    async fn find_tasks_by_short_id_prefix(&self, short_id: &str) -> Result<Vec<Task>, CoreError>;
    /// Applies `changes` only if the row still matches `expected`.
    ///
    /// A status change additionally requires the row to be ongoing, so terminal
    /// tasks can never be moved by this call.
    async fn conditional_update(
        &self,
        id: Uuid,
        expected: &TaskFilter,
        changes: &TaskChanges,
    ) -> Result<bool, CoreError>;
    async fn delete_task(&self, id: Uuid) -> Result<bool, CoreError>;
    /// Deletes the task only if it still matches `expected`.
    async fn delete_task_if(&self, id: Uuid, expected: &TaskFilter) -> Result<bool, CoreError>;
}

/// Domain-specific trait for recurrence template storage
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn create_template(&self, data: NewTemplateData) -> Result<RecurrenceTemplate, CoreError>;
    async fn find_template_by_id(&self, id: Uuid) -> Result<Option<RecurrenceTemplate>, CoreError>;
    async fn find_templates(&self, filter: &TemplateFilter) -> Result<Vec<RecurrenceTemplate>, CoreError>;
    async fn find_templates_by_short_id_prefix(
        &self,
        short_id: &str,
    ) -> Result<Vec<RecurrenceTemplate>, CoreError>;
    /// Advances `next_due_at` from `observed` to `next` and, only if that
    /// compare-and-swap matched, inserts `task`. Both happen in one transaction.
    ///
    /// Returns `None` when the template had already moved past `observed`.
    async fn claim_period(
        &self,
        template_id: Uuid,
        observed: DateTime<Utc>,
        next: DateTime<Utc>,
        task: NewTaskData,
    ) -> Result<Option<Task>, CoreError>;
    /// User edit guarded on the `next_due_at` the caller observed.
    async fn update_template(
        &self,
        id: Uuid,
        observed_next_due_at: DateTime<Utc>,
        update: TemplateUpdate,
    ) -> Result<bool, CoreError>;
    async fn delete_template(&self, id: Uuid) -> Result<bool, CoreError>;
}

/// Main repository trait that composes all domain traits
#[async_trait]
pub trait Repository: TaskRepository + TemplateRepository {
    // This trait automatically composes all domain-specific repositories
}

/// SQLite implementation of the repository pattern
#[derive(Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Repository for SqliteRepository {}

/// `LIKE` pattern matching ids stored as 16-byte blobs through `lower(hex(id))`.
pub(crate) fn id_prefix_pattern(short_id: &str) -> String {
    let mut pattern: String = short_id
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    pattern.push('%');
    pattern
}
