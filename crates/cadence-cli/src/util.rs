use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::repository::{TaskRepository, TemplateRepository};
use uuid::Uuid;

fn check_prefix(short_id: &str) -> Result<()> {
    if short_id.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    Ok(())
}

fn pick_one(kind: &str, short_id: &str, mut matches: Vec<(Uuid, String)>) -> Result<Uuid> {
    match matches.len() {
        1 => Ok(matches.remove(0).0),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No {} found with ID prefix '{}'",
            kind, short_id
        )))),
        _ => Err(anyhow!(CoreError::AmbiguousId(
            matches
                .into_iter()
                .map(|(id, name)| (id.to_string(), name))
                .collect()
        ))),
    }
}

pub async fn resolve_task_id<R>(repo: &R, short_id: &str) -> Result<Uuid>
where
    R: TaskRepository + ?Sized,
{
    if let Ok(id) = short_id.parse::<Uuid>() {
        return Ok(id);
    }
    check_prefix(short_id)?;
    let tasks = repo.find_tasks_by_short_id_prefix(short_id).await?;
    pick_one("task", short_id, tasks.into_iter().map(|t| (t.id, t.title)).collect())
}

pub async fn resolve_template_id<R>(repo: &R, short_id: &str) -> Result<Uuid>
where
    R: TemplateRepository + ?Sized,
{
    if let Ok(id) = short_id.parse::<Uuid>() {
        return Ok(id);
    }
    check_prefix(short_id)?;
    let templates = repo.find_templates_by_short_id_prefix(short_id).await?;
    pick_one(
        "template",
        short_id,
        templates.into_iter().map(|t| (t.id, t.name)).collect(),
    )
}
