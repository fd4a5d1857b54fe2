use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::models::{NewTemplateData, TemplateFilter, TemplateUpdate};
use cadence_core::repository::Repository;
use chrono::Utc;
use owo_colors::{OwoColorize, Style};

use crate::cli::{AddTemplateCommand, EditTemplateCommand, TemplateCommand, TemplateSubcommand};
use crate::parser::parse_time;
use crate::timezone::{format_in_timezone, normalize_timezone_input};
use crate::util::resolve_template_id;
use crate::views::table::display_templates;

pub async fn template_command<R>(
    repo: &R,
    command: TemplateCommand,
    default_timezone: &str,
) -> Result<()>
where
    R: Repository + ?Sized,
{
    match command.command {
        TemplateSubcommand::Add(add) => add_template(repo, add, default_timezone).await,
        TemplateSubcommand::List => {
            let templates = repo.find_templates(&TemplateFilter::default()).await?;
            display_templates(&templates);
            Ok(())
        }
        TemplateSubcommand::Edit(edit) => edit_template(repo, edit).await,
    }
}

async fn add_template<R>(repo: &R, command: AddTemplateCommand, default_timezone: &str) -> Result<()>
where
    R: Repository + ?Sized,
{
    let now = Utc::now();
    let next_due_at = command
        .starting
        .as_deref()
        .map(|s| parse_time(s, now))
        .transpose()?
        .unwrap_or(now);

    let mut data = NewTemplateData::new(command.name, command.every, next_due_at);
    if let Some(title) = command.title {
        data.title = title;
    }
    if let Some(description) = command.description {
        data.description = description;
    }
    if let Some(priority) = command.priority {
        data.priority = priority;
    }
    if let Some(estimate) = command.estimate {
        data.estimated_duration = estimate;
    }
    data.tags = command.tag;
    data.owner = command.owner;
    data.timezone = match command.timezone {
        Some(tz) => normalize_timezone_input(&tz)?,
        None => default_timezone.to_string(),
    };

    let template = repo.create_template(data).await?;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    println!(
        "{} Created {} template: {}",
        "✓".style(success_style),
        template.recurrence_pattern,
        template.name.bright_white().bold()
    );
    println!("  {} Template ID: {}", "→".style(info_style), template.id.to_string().yellow());
    println!(
        "  {} First period: {}",
        "→".style(info_style),
        format_in_timezone(template.next_due_at, &template.timezone)
    );
    Ok(())
}

async fn edit_template<R>(repo: &R, command: EditTemplateCommand) -> Result<()>
where
    R: Repository + ?Sized,
{
    let id = resolve_template_id(repo, &command.id).await?;
    let current = repo
        .find_template_by_id(id)
        .await?
        .ok_or_else(|| anyhow!(CoreError::NotFound(format!("template {}", id))))?;

    let update = TemplateUpdate {
        title: command.title,
        description: command.description,
        priority: command.priority,
        estimated_duration: command.estimate,
        recurrence_pattern: command.every,
        timezone: command.timezone.map(|tz| normalize_timezone_input(&tz)).transpose()?,
        next_due_at: command
            .next_due
            .as_deref()
            .map(|s| parse_time(s, Utc::now()))
            .transpose()?,
        active: match (command.pause, command.resume) {
            (true, _) => Some(false),
            (_, true) => Some(true),
            _ => None,
        },
    };
    if update.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }

    if !repo.update_template(id, current.next_due_at, update).await? {
        return Err(anyhow!(CoreError::ConcurrentModificationLost(id))
            .context("the template advanced while it was being edited; retry the edit"));
    }

    let edited = repo
        .find_template_by_id(id)
        .await?
        .ok_or_else(|| anyhow!(CoreError::NotFound(format!("template {}", id))))?;
    println!("Updated template: '{}'", edited.name);
    println!(
        "  next period {} ({})",
        format_in_timezone(edited.next_due_at, &edited.timezone),
        edited.recurrence_pattern
    );
    Ok(())
}
