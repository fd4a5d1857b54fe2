use crate::error::CoreError;
use crate::models::{NewTaskData, Task, TaskChanges, TaskFilter, TaskStatus};
use crate::repository::query_builder::SqlQueryBuilder;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::BTreeSet;
use uuid::Uuid;

#[async_trait]
impl super::TaskRepository for SqliteRepository {
    async fn create_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        let mut conn = self.pool().acquire().await?;
        Self::insert_task(&mut *conn, data).await
    }

    async fn find_tasks_by_short_id_prefix(&self, short_id: &str) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as("SELECT * FROM tasks WHERE lower(hex(id)) LIKE $1")
            .bind(super::id_prefix_pattern(short_id))
            .fetch_all(self.pool())
            .await?;
        Ok(tasks)
    }

    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        let task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(task)
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE 1 = 1");
        SqlQueryBuilder::push_task_filter(filter, &mut qb);
        qb.push(" ORDER BY deadline, id");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        let tasks = qb.build_query_as().fetch_all(self.pool()).await?;
        Ok(tasks)
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: &TaskFilter,
        changes: &TaskChanges,
    ) -> Result<bool, CoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET updated_at = ");
        qb.push_bind(changes.updated_at);

        if let Some(status) = changes.status {
            qb.push(", status = ");
            qb.push_bind(status);
        }
        if let Some(started_at) = changes.started_at {
            qb.push(", started_at = ");
            qb.push_bind(started_at);
        }
        if let Some(completed_at) = changes.completed_at {
            qb.push(", completed_at = ");
            qb.push_bind(completed_at);
        }
        if let Some(actual_duration) = changes.actual_duration {
            qb.push(", actual_duration = ");
            qb.push_bind(actual_duration);
        }
        if let Some(sent_at) = changes.last_reminder_sent_at {
            qb.push(", last_reminder_sent_at = ");
            qb.push_bind(sent_at);
        }
        if let Some(threshold) = changes.last_reminder_threshold {
            qb.push(", last_reminder_threshold = ");
            qb.push_bind(threshold);
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        SqlQueryBuilder::push_task_filter(expected, &mut qb);

        // Status only ever leaves `ongoing`; terminal rows are never rewritten.
        if changes.status.is_some() {
            qb.push(" AND status = ");
            qb.push_bind(TaskStatus::Ongoing);
        }

        let result = qb.build().execute(self.pool()).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_task_if(&self, id: Uuid, expected: &TaskFilter) -> Result<bool, CoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM tasks WHERE id = ");
        qb.push_bind(id);
        SqlQueryBuilder::push_task_filter(expected, &mut qb);

        let result = qb.build().execute(self.pool()).await?;
        Ok(result.rows_affected() == 1)
    }
}

impl SqliteRepository {
    /// Insert a validated task on an existing connection or transaction.
    pub(crate) async fn insert_task(
        conn: &mut SqliteConnection,
        data: NewTaskData,
    ) -> Result<Task, CoreError> {
        data.validate()?;

        let now = Utc::now();
        let task = Task {
            id: Uuid::now_v7(),
            title: data.title,
            description: data.description,
            deadline: data.deadline,
            status: TaskStatus::Ongoing,
            priority: data.priority,
            estimated_duration: data.estimated_duration,
            actual_duration: None,
            tags: Json(data.tags.into_iter().collect::<BTreeSet<_>>()),
            owner: data.owner,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            is_recurring: data.recurrence_pattern.is_recurring(),
            recurrence_pattern: data.recurrence_pattern,
            template_id: data.template_id,
            last_reminder_sent_at: None,
            last_reminder_threshold: None,
        };

        sqlx::query(
            r#"INSERT INTO tasks (id, title, description, deadline, status, priority, estimated_duration, actual_duration, tags, owner, created_at, updated_at, started_at, completed_at, is_recurring, recurrence_pattern, template_id, last_reminder_sent_at, last_reminder_threshold)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"#,
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.deadline)
        .bind(task.status)
        .bind(task.priority)
        .bind(task.estimated_duration)
        .bind(task.actual_duration)
        .bind(&task.tags)
        .bind(&task.owner)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.is_recurring)
        .bind(task.recurrence_pattern)
        .bind(task.template_id)
        .bind(task.last_reminder_sent_at)
        .bind(task.last_reminder_threshold)
        .execute(&mut *conn)
        .await?;

        Ok(task)
    }
}
