use cadence_core::jobs::JobReport;
use cadence_core::models::{RecurrenceTemplate, Task, TaskStatus};
use cadence_core::scheduler::{JobOutcome, JobRun, JobSpec};
use chrono::{DateTime, Utc};
use chrono_humanize::{Accuracy, HumanTime, Humanize, Tense};
use comfy_table::{Attribute, Cell, Color, Row, Table};
use std::time::Duration;

use crate::timezone::format_in_timezone;

fn short(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn humanize_std(duration: Duration) -> String {
    match chrono::Duration::from_std(duration) {
        Ok(d) => HumanTime::from(d).to_text_en(Accuracy::Precise, Tense::Present),
        Err(_) => format!("{}s", duration.as_secs()),
    }
}

pub fn display_tasks(tasks: &[Task], now: DateTime<Utc>) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Status", "Deadline", "Priority", "Owner", "Tags"]);

    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(task.short_id()));

        let mut title = String::new();
        if task.is_recurring {
            title.push('↻');
            title.push(' ');
        }
        title.push_str(&task.title);
        let mut title_cell = Cell::new(title);
        title_cell = match task.status {
            TaskStatus::Success | TaskStatus::Failure => title_cell
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey),
            TaskStatus::Ongoing if task.priority >= 4 => {
                title_cell.fg(Color::Red).add_attribute(Attribute::Bold)
            }
            TaskStatus::Ongoing => title_cell,
        };
        row.add_cell(title_cell);

        let status_cell = Cell::new(task.status.as_str());
        row.add_cell(match task.status {
            TaskStatus::Success => status_cell.fg(Color::Green),
            TaskStatus::Failure => status_cell.fg(Color::Red),
            TaskStatus::Ongoing => status_cell,
        });

        let due_text = task.deadline.humanize();
        let due_cell = if task.status != TaskStatus::Ongoing {
            Cell::new(due_text)
        } else if task.deadline < now {
            Cell::new(due_text).fg(Color::Red)
        } else if task.deadline.date_naive() == now.date_naive() {
            Cell::new(due_text).fg(Color::Yellow)
        } else {
            Cell::new(due_text)
        };
        row.add_cell(due_cell);

        row.add_cell(Cell::new(task.priority));
        row.add_cell(Cell::new(task.owner.as_deref().unwrap_or("-")));
        row.add_cell(Cell::new(if task.tags.is_empty() {
            "-".to_string()
        } else {
            task.tags.iter().cloned().collect::<Vec<_>>().join(", ")
        }));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_templates(templates: &[RecurrenceTemplate]) {
    if templates.is_empty() {
        println!("No templates found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Every", "Next due", "Timezone", "Active"]);

    for template in templates {
        let mut row = Row::new();
        row.add_cell(Cell::new(short(&template.id)));
        row.add_cell(Cell::new(&template.name));
        row.add_cell(Cell::new(&template.recurrence_pattern));
        row.add_cell(Cell::new(format_in_timezone(template.next_due_at, &template.timezone)));
        row.add_cell(Cell::new(&template.timezone));
        row.add_cell(if template.active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("paused").fg(Color::DarkGrey)
        });
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_report(report: &JobReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!(
        "{}{}: {} candidate(s), {} applied, {} skipped, {} failed",
        report.job, mode, report.candidates, report.applied, report.skipped, report.failed
    );
    if report.changes.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Subject", "Change"]);
    for change in &report.changes {
        table.add_row(vec![Cell::new(short(&change.subject_id)), Cell::new(&change.description)]);
    }
    println!("{table}");
}

pub fn display_jobs(jobs: &[JobSpec]) {
    let mut table = Table::new();
    table.set_header(vec!["Job", "Cadence", "Timeout"]);
    for job in jobs {
        table.add_row(vec![
            Cell::new(&job.name),
            Cell::new(humanize_std(job.cadence)),
            Cell::new(humanize_std(job.timeout)),
        ]);
    }
    println!("{table}");
}

pub fn display_history(runs: &[JobRun]) {
    if runs.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Job", "Started", "Outcome", "Summary"]);
    for run in runs {
        let outcome = match run.outcome {
            JobOutcome::Completed => Cell::new("completed").fg(Color::Green),
            JobOutcome::Failed => Cell::new("failed").fg(Color::Red),
            JobOutcome::TimedOut => Cell::new("timed out").fg(Color::Yellow),
            JobOutcome::Cancelled => Cell::new("cancelled").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(&run.job),
            Cell::new(run.started_at.format("%H:%M:%S").to_string()),
            outcome,
            Cell::new(&run.summary),
        ]);
    }
    println!("{table}");
}
