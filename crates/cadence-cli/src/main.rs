use anyhow::Context;
use cadence_core::db;
use cadence_core::engine::Engine;
use cadence_core::error::CoreError;
use cadence_core::notifier::{LogNotifier, Notifier, OutboxNotifier};
use cadence_core::repository::SqliteRepository;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod parser;
mod timezone;
mod util;
mod views;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            handle_error(anyhow::Error::new(e).context("Failed to load configuration"));
            std::process::exit(1);
        }
    };
    init_tracing(&config.log_filter);

    if let Err(e) = run(cli.command, config).await {
        handle_error(e);
        std::process::exit(1);
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(command: cli::Commands, config: config::Config) -> anyhow::Result<()> {
    let pool = db::establish_connection(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path))?;
    let repository = Arc::new(SqliteRepository::new(pool));

    let notifier: Arc<dyn Notifier> = match &config.notifier.outbox_path {
        Some(path) => Arc::new(OutboxNotifier::new(path)),
        None => Arc::new(LogNotifier),
    };
    let engine = Engine::new(repository.clone(), notifier, config.engine.clone())?
        .with_default_recipient(config.notifier.default_recipient.clone());

    match command {
        cli::Commands::Run(command) => commands::run::run_job(&engine, command).await,
        cli::Commands::Serve => commands::serve::serve(&engine).await,
        cli::Commands::Jobs => {
            commands::jobs::list_jobs(&engine);
            Ok(())
        }
        cli::Commands::Task(command) => {
            commands::task::task_command(repository.as_ref(), command).await
        }
        cli::Commands::Template(command) => {
            commands::template::template_command(
                repository.as_ref(),
                command,
                &config.default_timezone,
            )
            .await
        }
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    match err.downcast_ref::<CoreError>() {
        Some(CoreError::NotFound(s)) => {
            eprintln!("{} {}", "Error:".style(error_style), s);
        }
        Some(CoreError::AmbiguousId(candidates)) => {
            eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
            eprintln!("Did you mean one of these?");
            for (id, name) in candidates {
                eprintln!("  {} ({})", id.yellow(), name);
            }
        }
        Some(CoreError::InvalidInput(s)) => {
            eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
        }
        Some(CoreError::TerminalStateViolation { id, status }) => {
            eprintln!(
                "{} Task {} is already {} and cannot change status",
                "Error:".style(error_style),
                id.to_string().yellow(),
                status.yellow()
            );
        }
        Some(CoreError::StoreUnavailable(e)) => {
            eprintln!("{} Task store unavailable: {}", "Error:".style(error_style), e);
        }
        Some(CoreError::NotifierFailure(s)) => {
            eprintln!("{} Notifier failure: {}", "Error:".style(error_style), s);
        }
        _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
    }
}
