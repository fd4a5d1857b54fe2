use anyhow::Result;
use cadence_core::lifecycle::{complete_task, fail_task, start_task};
use cadence_core::models::{NewTaskData, TaskFilter};
use cadence_core::repository::Repository;
use chrono::Utc;
use owo_colors::{OwoColorize, Style};

use crate::cli::{AddTaskCommand, ListTasksCommand, TaskCommand, TaskIdCommand, TaskSubcommand};
use crate::parser::parse_time;
use crate::util::{resolve_task_id, resolve_template_id};
use crate::views::table::display_tasks;

pub async fn task_command<R>(repo: &R, command: TaskCommand) -> Result<()>
where
    R: Repository + ?Sized,
{
    match command.command {
        TaskSubcommand::Add(add) => add_task(repo, add).await,
        TaskSubcommand::List(list) => list_tasks(repo, list).await,
        TaskSubcommand::Start(cmd) => {
            let id = resolve_task_id(repo, &cmd.id).await?;
            let task = start_task(repo, id, Utc::now()).await?;
            println!("Started task: '{}'", task.title);
            Ok(())
        }
        TaskSubcommand::Complete(cmd) => complete(repo, cmd).await,
        TaskSubcommand::Fail(cmd) => {
            let id = resolve_task_id(repo, &cmd.id).await?;
            let task = fail_task(repo, id, Utc::now()).await?;
            println!("Marked task '{}' as failed", task.title);
            Ok(())
        }
    }
}

async fn add_task<R>(repo: &R, command: AddTaskCommand) -> Result<()>
where
    R: Repository + ?Sized,
{
    let deadline = parse_time(&command.due, Utc::now())?;
    let mut data = NewTaskData::new(command.title, deadline);
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

    let task = repo.create_task(data).await?;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    println!("{} Created task: {}", "✓".style(success_style), task.title.bright_white().bold());
    println!("  {} Task ID: {}", "→".style(info_style), task.id.to_string().yellow());
    println!("  {} Deadline: {}", "→".style(info_style), task.deadline.to_rfc2822());
    Ok(())
}

async fn list_tasks<R>(repo: &R, command: ListTasksCommand) -> Result<()>
where
    R: Repository + ?Sized,
{
    let mut filter = TaskFilter::default();
    if let Some(status) = command.status {
        filter.status_in = vec![status];
    }
    if let Some(template) = &command.template {
        filter = filter.template(resolve_template_id(repo, template).await?);
    }
    if let Some(limit) = command.limit {
        filter = filter.limit(limit);
    }

    let tasks = repo.find_tasks(&filter).await?;
    display_tasks(&tasks, Utc::now());
    Ok(())
}

async fn complete<R>(repo: &R, command: TaskIdCommand) -> Result<()>
where
    R: Repository + ?Sized,
{
    let id = resolve_task_id(repo, &command.id).await?;
    let task = complete_task(repo, id, Utc::now()).await?;
    println!("Completed task: '{}'", task.title);
    if let Some(minutes) = task.actual_duration {
        println!("  took {} minute(s), estimated {}", minutes, task.estimated_duration);
    }
    Ok(())
}
