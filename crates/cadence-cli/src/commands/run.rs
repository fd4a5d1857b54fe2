use anyhow::Result;
use cadence_core::engine::Engine;
use cadence_core::error::CoreError;
use cadence_core::jobs::JobKind;
use chrono::Utc;
use dialoguer::Confirm;

use crate::cli::RunCommand;
use crate::parser::parse_time;
use crate::views::table::display_report;

/// One pass of one job, or the changes it would make with `--dry-run`.
pub async fn run_job(engine: &Engine, command: RunCommand) -> Result<()> {
    let now = match &command.at {
        Some(at) => parse_time(at, Utc::now())?,
        None => Utc::now(),
    };
    let job = engine.job(command.job);

    if command.dry_run {
        let report = job.dry_run(now).await?;
        display_report(&report);
        return Ok(());
    }

    if command.job == JobKind::RetentionCleaner && !command.yes {
        let planned = job.plan(now).await?;
        if planned.is_empty() {
            println!("Nothing to purge.");
            return Ok(());
        }
        let confirmation = Confirm::new()
            .with_prompt(format!("Permanently delete {} task(s)?", planned.len()))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmation {
            println!("Purge cancelled.");
            return Ok(());
        }
    }

    let report = job.run(now).await?;
    display_report(&report);

    if command.job == JobKind::ReminderDispatcher && report.failed > 0 {
        return Err(CoreError::NotifierFailure(format!(
            "{} reminder(s) could not be delivered",
            report.failed
        ))
        .into());
    }
    Ok(())
}
