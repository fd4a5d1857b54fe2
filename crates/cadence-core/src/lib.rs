//! # Cadence Core Library
//!
//! Background automation for a task store: deadlines, recurrence and
//! reminders are advanced by periodic jobs that are safe to run from more
//! than one process at a time.
//!
//! ## Features
//!
//! - **Overdue detection**: ongoing tasks past their deadline move to `failure`
//! - **Recurring generation**: templates produce one task per period, with
//!   calendar-aware daily/weekly/monthly arithmetic in the template's timezone
//! - **Reminders**: at most one notification per task per lead-time threshold
//! - **Retention**: terminal tasks older than the horizon are purged
//! - **Race safety**: every automated mutation is a conditional update, so
//!   overlapping runs never double-apply
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`models`]: Tasks, templates, filters and change sets
//! - [`repository`]: Store contract and its SQLite implementation
//! - [`recurrence`]: Period arithmetic
//! - [`jobs`]: The four periodic jobs
//! - [`scheduler`]: Timer loop with per-job timeouts and bounded history
//! - [`engine`]: Wires configuration, store and notifier into the job registry
//! - [`lifecycle`]: Status transitions requested by users
//! - [`notifier`]: Reminder delivery contract
//! - [`error`]: Error taxonomy
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     clock::SystemClock, config::EngineConfig, db, engine::Engine,
//!     notifier::LogNotifier, repository::SqliteRepository,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("cadence.db").await?;
//!     let repo = Arc::new(SqliteRepository::new(pool));
//!
//!     let engine = Engine::new(repo, Arc::new(LogNotifier), EngineConfig::default())?;
//!     let handle = engine.scheduler(Arc::new(SystemClock))?.spawn();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod models;
pub mod notifier;
pub mod recurrence;
pub mod repository;
pub mod scheduler;
pub mod timezone;
