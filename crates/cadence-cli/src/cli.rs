use cadence_core::jobs::JobKind;
use cadence_core::models::{RecurrencePattern, TaskStatus};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Task lifecycle automation: overdue detection, recurring generation,
/// deadline reminders and retention
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./cadence.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a single pass of one job
    Run(RunCommand),
    /// Run the scheduler with every job until Ctrl-C
    Serve,
    /// List the job registry
    Jobs,
    /// Manage tasks
    Task(TaskCommand),
    /// Manage recurrence templates
    Template(TemplateCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct RunCommand {
    /// Job to run (overdue-detector, recurring-generator, reminder-dispatcher, retention-cleaner)
    pub job: JobKind,
    /// Print the changes the pass would make without committing them
    #[arg(long)]
    pub dry_run: bool,
    /// Evaluate the pass as of this time instead of now (e.g. "2025-03-01T09:00:00Z", "tomorrow 9am")
    #[arg(long)]
    pub at: Option<String>,
    /// Skip the confirmation before purging tasks
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskSubcommand {
    /// Add a new task
    Add(AddTaskCommand),
    /// List tasks
    List(ListTasksCommand),
    /// Record that work on a task started
    Start(TaskIdCommand),
    /// Mark a task as successfully completed
    Complete(TaskIdCommand),
    /// Mark a task as failed
    Fail(TaskIdCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddTaskCommand {
    /// The title of the task
    pub title: String,
    /// The deadline (e.g. "2025-03-01T17:00:00Z", "friday 5pm")
    #[arg(short, long)]
    pub due: String,
    #[arg(short = 'D', long)]
    pub description: Option<String>,
    /// Priority from 1 (lowest) to 5 (highest)
    #[arg(short, long)]
    pub priority: Option<i64>,
    /// Estimated duration in minutes
    #[arg(short, long)]
    pub estimate: Option<i64>,
    /// Tags to add to the task
    #[arg(short, long, num_args = 1..)]
    pub tag: Vec<String>,
    /// Who receives reminders for this task
    #[arg(short, long)]
    pub owner: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListTasksCommand {
    /// Only show tasks with this status
    #[arg(short, long)]
    pub status: Option<TaskStatus>,
    /// Only show tasks generated from this template
    #[arg(long)]
    pub template: Option<String>,
    #[arg(short, long)]
    pub limit: Option<i64>,
}

#[derive(Parser, Debug, Clone)]
pub struct TaskIdCommand {
    /// The ID (or unique ID prefix) of the task
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct TemplateCommand {
    #[command(subcommand)]
    pub command: TemplateSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TemplateSubcommand {
    /// Add a recurrence template
    Add(AddTemplateCommand),
    /// List recurrence templates
    List,
    /// Edit a recurrence template
    Edit(EditTemplateCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddTemplateCommand {
    /// Unique template name
    pub name: String,
    /// Recurrence frequency (daily, weekly, monthly)
    #[arg(long)]
    pub every: RecurrencePattern,
    /// Start of the first period (defaults to now)
    #[arg(long)]
    pub starting: Option<String>,
    /// Title of generated tasks (defaults to the template name)
    #[arg(long)]
    pub title: Option<String>,
    #[arg(short = 'D', long)]
    pub description: Option<String>,
    #[arg(short, long)]
    pub priority: Option<i64>,
    /// Estimated duration in minutes; generated deadlines are period start plus this
    #[arg(short, long)]
    pub estimate: Option<i64>,
    #[arg(short, long, num_args = 1..)]
    pub tag: Vec<String>,
    #[arg(short, long)]
    pub owner: Option<String>,
    /// IANA timezone periods advance in (defaults to the configured timezone)
    #[arg(long)]
    pub timezone: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct EditTemplateCommand {
    /// The ID (or unique ID prefix) of the template
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(short = 'D', long)]
    pub description: Option<String>,
    #[arg(short, long)]
    pub priority: Option<i64>,
    #[arg(short, long)]
    pub estimate: Option<i64>,
    /// New frequency; applies from the period after the one already scheduled
    #[arg(long)]
    pub every: Option<RecurrencePattern>,
    #[arg(long)]
    pub timezone: Option<String>,
    /// Move the next period later (never earlier)
    #[arg(long)]
    pub next_due: Option<String>,
    /// Stop generating tasks
    #[arg(long, conflicts_with = "resume")]
    pub pause: bool,
    /// Resume generating tasks
    #[arg(long)]
    pub resume: bool,
}
