use crate::error::CoreError;
use crate::models::{
    NewTaskData, NewTemplateData, RecurrenceTemplate, Task, TemplateFilter, TemplateUpdate,
};
use crate::repository::query_builder::SqlQueryBuilder;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeSet;
use uuid::Uuid;

#[async_trait]
impl super::TemplateRepository for SqliteRepository {
    async fn create_template(&self, data: NewTemplateData) -> Result<RecurrenceTemplate, CoreError> {
        data.validate()?;

        let now = Utc::now();
        let template = RecurrenceTemplate {
            id: Uuid::now_v7(),
            name: data.name,
            title: data.title,
            description: data.description,
            priority: data.priority,
            estimated_duration: data.estimated_duration,
            tags: Json(data.tags.into_iter().collect::<BTreeSet<_>>()),
            owner: data.owner,
            recurrence_pattern: data.recurrence_pattern.as_str().to_string(),
            timezone: data.timezone,
            next_due_at: data.next_due_at,
            active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"INSERT INTO recurrence_templates (id, name, title, description, priority, estimated_duration, tags, owner, recurrence_pattern, timezone, next_due_at, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.title)
        .bind(&template.description)
        .bind(template.priority)
        .bind(template.estimated_duration)
        .bind(&template.tags)
        .bind(&template.owner)
        .bind(&template.recurrence_pattern)
        .bind(&template.timezone)
        .bind(template.next_due_at)
        .bind(template.active)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(self.pool())
        .await?;

        Ok(template)
    }

    async fn find_template_by_id(&self, id: Uuid) -> Result<Option<RecurrenceTemplate>, CoreError> {
        let template = sqlx::query_as("SELECT * FROM recurrence_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(template)
    }

    async fn find_templates_by_short_id_prefix(
        &self,
        short_id: &str,
    ) -> Result<Vec<RecurrenceTemplate>, CoreError> {
        let templates = sqlx::query_as("SELECT * FROM recurrence_templates WHERE lower(hex(id)) LIKE $1")
            .bind(super::id_prefix_pattern(short_id))
            .fetch_all(self.pool())
            .await?;
        Ok(templates)
    }

    async fn find_templates(&self, filter: &TemplateFilter) -> Result<Vec<RecurrenceTemplate>, CoreError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM recurrence_templates WHERE 1 = 1");
        SqlQueryBuilder::push_template_filter(filter, &mut qb);
        qb.push(" ORDER BY next_due_at, id");

        let templates = qb.build_query_as().fetch_all(self.pool()).await?;
        Ok(templates)
    }

    async fn claim_period(
        &self,
        template_id: Uuid,
        observed: DateTime<Utc>,
        next: DateTime<Utc>,
        task: NewTaskData,
    ) -> Result<Option<Task>, CoreError> {
        if next <= observed {
            return Err(CoreError::InvalidInput(format!(
                "next_due_at must move forward: {} -> {}",
                observed, next
            )));
        }

        let mut tx = self.pool().begin().await?;

        let claimed = sqlx::query(
            r#"UPDATE recurrence_templates
            SET next_due_at = $1, updated_at = $2
            WHERE id = $3 AND next_due_at = $4 AND active = 1"#,
        )
        .bind(next)
        .bind(Utc::now())
        .bind(template_id)
        .bind(observed)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            // Someone else already generated this period.
            tx.rollback().await?;
            return Ok(None);
        }

        let task = Self::insert_task(&mut *tx, task).await?;
        tx.commit().await?;
        Ok(Some(task))
    }

    async fn update_template(
        &self,
        id: Uuid,
        observed_next_due_at: DateTime<Utc>,
        update: TemplateUpdate,
    ) -> Result<bool, CoreError> {
        if let Some(next_due_at) = update.next_due_at {
            if next_due_at < observed_next_due_at {
                return Err(CoreError::InvalidInput(format!(
                    "next_due_at cannot move backwards ({} < {})",
                    next_due_at, observed_next_due_at
                )));
            }
        }
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(CoreError::InvalidInput("title must not be empty".to_string()));
            }
        }
        if let Some(priority) = update.priority {
            if !(crate::models::MIN_PRIORITY..=crate::models::MAX_PRIORITY).contains(&priority) {
                return Err(CoreError::InvalidInput(format!("priority {} outside 1..=5", priority)));
            }
        }
        if let Some(duration) = update.estimated_duration {
            crate::models::validate_estimated_duration(duration)?;
        }
        if let Some(pattern) = update.recurrence_pattern {
            if !pattern.is_recurring() {
                return Err(CoreError::InvalidInput(
                    "a template needs a daily, weekly or monthly pattern".to_string(),
                ));
            }
        }
        if let Some(timezone) = &update.timezone {
            crate::timezone::validate_timezone(timezone)?;
        }

        // Changing the pattern leaves next_due_at alone: the period already
        // scheduled is honored and the new pattern applies from the next advance.
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE recurrence_templates SET updated_at = ");
        qb.push_bind(Utc::now());

        if let Some(title) = update.title {
            qb.push(", title = ");
            qb.push_bind(title);
        }
        if let Some(description) = update.description {
            qb.push(", description = ");
            qb.push_bind(description);
        }
        if let Some(priority) = update.priority {
            qb.push(", priority = ");
            qb.push_bind(priority);
        }
        if let Some(duration) = update.estimated_duration {
            qb.push(", estimated_duration = ");
            qb.push_bind(duration);
        }
        if let Some(pattern) = update.recurrence_pattern {
            qb.push(", recurrence_pattern = ");
            qb.push_bind(pattern.as_str());
        }
        if let Some(timezone) = update.timezone {
            qb.push(", timezone = ");
            qb.push_bind(timezone);
        }
        if let Some(next_due_at) = update.next_due_at {
            qb.push(", next_due_at = ");
            qb.push_bind(next_due_at);
        }
        if let Some(active) = update.active {
            qb.push(", active = ");
            qb.push_bind(active);
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND next_due_at = ");
        qb.push_bind(observed_next_due_at);

        let result = qb.build().execute(self.pool()).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM recurrence_templates WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
