use crate::models::{TaskFilter, TemplateFilter};
use sqlx::{QueryBuilder, Sqlite};

/// Utility functions for turning filters into SQL predicates
pub struct SqlQueryBuilder;

impl SqlQueryBuilder {
    /// Append `AND`-joined predicates for every field set on `filter`.
    ///
    /// The caller must already have pushed a leading predicate (for example
    /// `WHERE 1 = 1` or `WHERE id = ?`).
    pub fn push_task_filter<'a>(filter: &TaskFilter, qb: &mut QueryBuilder<'a, Sqlite>) {
        if !filter.status_in.is_empty() {
            qb.push(" AND status IN (");
            let mut separated = qb.separated(", ");
            for status in &filter.status_in {
                separated.push_bind(*status);
            }
            separated.push_unseparated(")");
        }
        if let Some(before) = filter.deadline_before {
            qb.push(" AND deadline < ");
            qb.push_bind(before);
        }
        if let Some(after) = filter.deadline_after {
            qb.push(" AND deadline > ");
            qb.push_bind(after);
        }
        if let Some(before) = filter.updated_before {
            qb.push(" AND updated_at < ");
            qb.push_bind(before);
        }
        if let Some(template_id) = filter.template_id {
            qb.push(" AND template_id = ");
            qb.push_bind(template_id);
        }
        match filter.reminder_threshold {
            Some(Some(threshold)) => {
                qb.push(" AND last_reminder_threshold = ");
                qb.push_bind(threshold);
            }
            Some(None) => {
                qb.push(" AND last_reminder_threshold IS NULL");
            }
            None => {}
        }
    }

    pub fn push_template_filter<'a>(filter: &TemplateFilter, qb: &mut QueryBuilder<'a, Sqlite>) {
        if let Some(active) = filter.active {
            qb.push(" AND active = ");
            qb.push_bind(active);
        }
        if let Some(due) = filter.due_at_or_before {
            qb.push(" AND next_due_at <= ");
            qb.push_bind(due);
        }
    }
}
