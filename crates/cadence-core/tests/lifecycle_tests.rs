use async_trait::async_trait;
use cadence_core::db::{establish_connection, DbPool};
use cadence_core::error::CoreError;
use cadence_core::jobs::{
    Job, OverdueDetector, RecurringGenerator, ReminderDispatcher, RetentionCleaner,
};
use cadence_core::lifecycle::{complete_task, fail_task, start_task, transition_status};
use cadence_core::models::*;
use cadence_core::notifier::{Notifier, ReminderMessage, ReminderTemplate};
use cadence_core::repository::{SqliteRepository, TaskRepository, TemplateRepository};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

const HOUR: u64 = 3600;

/// Helper function to create a test database
async fn setup_test_db() -> (Arc<SqliteRepository>, DbPool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    (Arc::new(SqliteRepository::new(pool.clone())), pool, temp_dir)
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

async fn create_task(repo: &SqliteRepository, title: &str, deadline: DateTime<Utc>) -> Task {
    repo.create_task(NewTaskData::new(title, deadline))
        .await
        .expect("Failed to create test task")
}

async fn create_template(
    repo: &SqliteRepository,
    name: &str,
    pattern: RecurrencePattern,
    next_due_at: DateTime<Utc>,
) -> RecurrenceTemplate {
    repo.create_template(NewTemplateData::new(name, pattern, next_due_at))
        .await
        .expect("Failed to create test template")
}

async fn reload(repo: &SqliteRepository, task: &Task) -> Task {
    repo.find_task_by_id(task.id)
        .await
        .unwrap()
        .expect("task should still exist")
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<ReminderMessage>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<ReminderMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &ReminderMessage) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::NotifierFailure("smtp relay unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Overdue detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_overdue_task_is_marked_failed() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "File report", now - Duration::hours(1)).await;

    let detector = OverdueDetector::new(repo.clone());
    assert_eq!(detector.check_and_mark(now).await.unwrap(), 1);

    let task = reload(&repo, &task).await;
    assert_eq!(task.status, TaskStatus::Failure);
    assert_eq!(task.updated_at, now);
}

#[tokio::test]
async fn test_overdue_detection_is_idempotent() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    create_task(&repo, "late one", now - Duration::minutes(5)).await;
    create_task(&repo, "late two", now - Duration::days(2)).await;
    let upcoming = create_task(&repo, "upcoming", now + Duration::hours(3)).await;

    let detector = OverdueDetector::new(repo.clone());
    assert_eq!(detector.check_and_mark(now).await.unwrap(), 2);
    assert_eq!(detector.check_and_mark(now).await.unwrap(), 0);

    assert_eq!(reload(&repo, &upcoming).await.status, TaskStatus::Ongoing);
}

#[tokio::test]
async fn test_detector_leaves_terminal_tasks_alone() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let done = create_task(&repo, "done early", now - Duration::hours(2)).await;
    complete_task(repo.as_ref(), done.id, now - Duration::hours(3)).await.unwrap();

    let detector = OverdueDetector::new(repo.clone());
    assert_eq!(detector.check_and_mark(now).await.unwrap(), 0);

    let done = reload(&repo, &done).await;
    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.updated_at, now - Duration::hours(3));
}

#[tokio::test]
async fn test_detector_dry_run_commits_nothing() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "late", now - Duration::hours(1)).await;

    let detector = OverdueDetector::new(repo.clone());
    let report = detector.dry_run(now).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.changes[0].subject_id, task.id);

    assert_eq!(reload(&repo, &task).await.status, TaskStatus::Ongoing);
}

// ---------------------------------------------------------------------------
// Lifecycle state machine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reopening_failed_task_is_rejected() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "missed", now - Duration::hours(1)).await;
    fail_task(repo.as_ref(), task.id, now).await.unwrap();

    let result = transition_status(repo.as_ref(), task.id, TaskStatus::Ongoing, now).await;
    assert!(matches!(
        result,
        Err(CoreError::TerminalStateViolation { status: TaskStatus::Failure, .. })
    ));
    assert_eq!(reload(&repo, &task).await.status, TaskStatus::Failure);
}

#[tokio::test]
async fn test_completing_terminal_task_is_rejected() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "finished", now + Duration::hours(1)).await;
    complete_task(repo.as_ref(), task.id, now).await.unwrap();

    let result = fail_task(repo.as_ref(), task.id, now).await;
    assert!(matches!(result, Err(CoreError::TerminalStateViolation { .. })));
    assert_eq!(reload(&repo, &task).await.status, TaskStatus::Success);
}

#[tokio::test]
async fn test_complete_records_actual_duration() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "write tests", now + Duration::hours(4)).await;

    start_task(repo.as_ref(), task.id, now).await.unwrap();
    let done = complete_task(repo.as_ref(), task.id, now + Duration::minutes(45))
        .await
        .unwrap();

    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.started_at, Some(now));
    assert_eq!(done.completed_at, Some(now + Duration::minutes(45)));
    assert_eq!(done.actual_duration, Some(45));
}

#[tokio::test]
async fn test_ongoing_target_on_ongoing_task_is_invalid() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let task = create_task(&repo, "noop", fixed_now()).await;

    let result = transition_status(repo.as_ref(), task.id, TaskStatus::Ongoing, fixed_now()).await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_conditional_update_never_moves_terminal_status() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "closed", now).await;
    complete_task(repo.as_ref(), task.id, now).await.unwrap();

    // Even with an expectation that matches, a status change needs `ongoing`.
    let expected = TaskFilter {
        status_in: vec![TaskStatus::Success],
        ..Default::default()
    };
    let changes = TaskChanges::at(now).status(TaskStatus::Failure);
    assert!(!repo.conditional_update(task.id, &expected, &changes).await.unwrap());
    assert_eq!(reload(&repo, &task).await.status, TaskStatus::Success);
}

// ---------------------------------------------------------------------------
// Recurring generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_daily_template_generates_one_task() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let original = now - Duration::seconds(1);
    let template = create_template(&repo, "standup", RecurrencePattern::Daily, original).await;

    let generator = RecurringGenerator::new(repo.clone());
    let report = generator.generate_due(now).await.unwrap();
    assert_eq!(report.applied, 1);

    let tasks = repo
        .find_tasks(&TaskFilter::default().template(template.id))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Ongoing);
    assert!(tasks[0].is_recurring);
    assert_eq!(tasks[0].recurrence_pattern, RecurrencePattern::Daily);
    assert_eq!(tasks[0].deadline, original + Duration::minutes(DEFAULT_ESTIMATED_DURATION));

    let template = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(template.next_due_at, original + Duration::days(1));

    // Nothing is due any more.
    let again = generator.generate_due(now).await.unwrap();
    assert_eq!(again.applied, 0);
}

#[tokio::test]
async fn test_catchup_generates_every_missed_period() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let first = now - Duration::days(3) + Duration::minutes(1);
    let template = create_template(&repo, "log rotation", RecurrencePattern::Daily, first).await;

    let generator = RecurringGenerator::new(repo.clone()).with_catchup(true, 100);
    let report = generator.generate_due(now).await.unwrap();
    assert_eq!(report.applied, 3);

    let template = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(template.next_due_at, first + Duration::days(3));
    assert!(template.next_due_at > now);
}

#[tokio::test]
async fn test_catchup_respects_batch_size() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let first = now - Duration::days(10);
    let template = create_template(&repo, "backlog", RecurrencePattern::Daily, first).await;

    let generator = RecurringGenerator::new(repo.clone()).with_catchup(true, 4);
    assert_eq!(generator.generate_due(now).await.unwrap().applied, 4);

    let template = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(template.next_due_at, first + Duration::days(4));
}

#[tokio::test]
async fn test_without_catchup_only_latest_period_is_generated() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let first = now - Duration::weeks(3) + Duration::hours(1);
    let template = create_template(&repo, "weekly review", RecurrencePattern::Weekly, first).await;

    let generator = RecurringGenerator::new(repo.clone()).with_catchup(false, 100);
    assert_eq!(generator.generate_due(now).await.unwrap().applied, 1);

    let tasks = repo
        .find_tasks(&TaskFilter::default().template(template.id))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    let latest = first + Duration::weeks(2);
    assert_eq!(tasks[0].deadline, latest + Duration::minutes(DEFAULT_ESTIMATED_DURATION));

    let template = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(template.next_due_at, first + Duration::weeks(3));
}

#[tokio::test]
async fn test_monthly_template_clamps_to_month_end() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let jan_31 = Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap();
    let template = create_template(&repo, "invoice", RecurrencePattern::Monthly, jan_31).await;

    let generator = RecurringGenerator::new(repo.clone());
    generator.generate_due(jan_31 + Duration::hours(1)).await.unwrap();

    let template = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(
        template.next_due_at,
        Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_invalid_template_is_skipped_and_others_still_generate() {
    let (repo, pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let broken = create_template(&repo, "broken", RecurrencePattern::Daily, now - Duration::hours(1)).await;
    let healthy = create_template(&repo, "healthy", RecurrencePattern::Daily, now - Duration::hours(1)).await;

    sqlx::query("UPDATE recurrence_templates SET recurrence_pattern = 'fortnightly' WHERE id = $1")
        .bind(broken.id)
        .execute(&pool)
        .await
        .unwrap();

    let generator = RecurringGenerator::new(repo.clone());
    let report = generator.generate_due(now).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 1);

    let broken_tasks = repo.find_tasks(&TaskFilter::default().template(broken.id)).await.unwrap();
    let healthy_tasks = repo.find_tasks(&TaskFilter::default().template(healthy.id)).await.unwrap();
    assert!(broken_tasks.is_empty());
    assert_eq!(healthy_tasks.len(), 1);

    let broken = repo.find_template_by_id(broken.id).await.unwrap().unwrap();
    assert_eq!(broken.next_due_at, now - Duration::hours(1));
}

#[tokio::test]
async fn test_inactive_template_is_not_generated() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let template = create_template(&repo, "paused", RecurrencePattern::Daily, now - Duration::hours(1)).await;
    let paused = TemplateUpdate {
        active: Some(false),
        ..Default::default()
    };
    assert!(repo.update_template(template.id, template.next_due_at, paused).await.unwrap());

    let report = RecurringGenerator::new(repo.clone()).generate_due(now).await.unwrap();
    assert_eq!(report.candidates, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generators_create_exactly_one_task() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let original = now - Duration::seconds(1);
    let template = create_template(&repo, "race", RecurrencePattern::Daily, original).await;

    let first = RecurringGenerator::new(repo.clone());
    let second = RecurringGenerator::new(repo.clone());
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.generate_due(now).await }),
        tokio::spawn(async move { second.generate_due(now).await }),
    );
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());
    assert_eq!(a.applied + b.applied, 1);

    let tasks = repo
        .find_tasks(&TaskFilter::default().template(template.id))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);

    let template = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(template.next_due_at, original + Duration::days(1));
}

#[tokio::test]
async fn test_stale_claim_creates_nothing() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let template = create_template(&repo, "claim", RecurrencePattern::Daily, now).await;
    let task = NewTaskData::from_template(&template, now).unwrap();

    let first = repo
        .claim_period(template.id, now, now + Duration::days(1), task.clone())
        .await
        .unwrap();
    assert!(first.is_some());

    let second = repo
        .claim_period(template.id, now, now + Duration::days(1), task)
        .await
        .unwrap();
    assert!(second.is_none());

    let tasks = repo.find_tasks(&TaskFilter::default().template(template.id)).await.unwrap();
    assert_eq!(tasks.len(), 1);
}

// ---------------------------------------------------------------------------
// Template edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pattern_edit_keeps_scheduled_period() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let due = now + Duration::hours(2);
    let template = create_template(&repo, "edit me", RecurrencePattern::Daily, due).await;

    let update = TemplateUpdate {
        recurrence_pattern: Some(RecurrencePattern::Weekly),
        ..Default::default()
    };
    assert!(repo.update_template(template.id, due, update).await.unwrap());

    let edited = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(edited.recurrence_pattern, "weekly");
    assert_eq!(edited.next_due_at, due);

    // The new pattern applies from the next advance.
    RecurringGenerator::new(repo.clone())
        .generate_due(due + Duration::minutes(1))
        .await
        .unwrap();
    let advanced = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(advanced.next_due_at, due + Duration::weeks(1));
}

#[tokio::test]
async fn test_next_due_at_cannot_move_backwards() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let due = fixed_now();
    let template = create_template(&repo, "forward only", RecurrencePattern::Daily, due).await;

    let update = TemplateUpdate {
        next_due_at: Some(due - Duration::days(1)),
        ..Default::default()
    };
    let result = repo.update_template(template.id, due, update).await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_edit_against_stale_next_due_at_is_refused() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let due = fixed_now();
    let template = create_template(&repo, "stale", RecurrencePattern::Daily, due).await;

    let update = TemplateUpdate {
        title: Some("renamed".to_string()),
        ..Default::default()
    };
    let applied = repo
        .update_template(template.id, due - Duration::days(1), update)
        .await
        .unwrap();
    assert!(!applied);

    let unchanged = repo.find_template_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(unchanged.title, "stale");
}

// ---------------------------------------------------------------------------
// Reminders
// ---------------------------------------------------------------------------

fn thresholds() -> Vec<StdDuration> {
    vec![StdDuration::from_secs(24 * HOUR), StdDuration::from_secs(HOUR)]
}

#[tokio::test]
async fn test_reminder_sent_once_per_threshold() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "renew certificate", now + Duration::hours(23)).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = ReminderDispatcher::new(repo.clone(), notifier.clone(), &thresholds());

    let report = dispatcher.dispatch_due(now, &thresholds()).await.unwrap();
    assert_eq!(report.applied, 1);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload.threshold_secs, (24 * HOUR) as i64);
    assert_eq!(sent[0].template, ReminderTemplate::Upcoming);

    let task = reload(&repo, &task).await;
    assert_eq!(task.last_reminder_threshold, Some((24 * HOUR) as i64));
    assert_eq!(task.last_reminder_sent_at, Some(now));

    let second = dispatcher.dispatch_due(now, &thresholds()).await.unwrap();
    assert_eq!(second.applied, 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_reminder_escalates_to_more_urgent_threshold() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let deadline = now + Duration::hours(23);
    create_task(&repo, "ship release", deadline).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = ReminderDispatcher::new(repo.clone(), notifier.clone(), &thresholds());

    dispatcher.dispatch_due(now, &thresholds()).await.unwrap();
    dispatcher
        .dispatch_due(deadline - Duration::minutes(30), &thresholds())
        .await
        .unwrap();
    dispatcher
        .dispatch_due(deadline - Duration::minutes(20), &thresholds())
        .await
        .unwrap();

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].payload.threshold_secs, HOUR as i64);
    assert_eq!(sent[1].template, ReminderTemplate::Urgent);
    assert!(sent[1].payload.subject.starts_with("URGENT"));
}

#[tokio::test]
async fn test_reminder_goes_to_owner_or_default_recipient() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let mut owned = NewTaskData::new("owned", now + Duration::minutes(30));
    owned.owner = Some("ops@example.com".to_string());
    repo.create_task(owned).await.unwrap();
    create_task(&repo, "unowned", now + Duration::minutes(40)).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = ReminderDispatcher::new(repo.clone(), notifier.clone(), &thresholds())
        .with_default_recipient("team@example.com");
    dispatcher.dispatch_due(now, &thresholds()).await.unwrap();

    let mut recipients: Vec<String> = notifier.sent().into_iter().map(|m| m.recipient).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["ops@example.com", "team@example.com"]);
}

#[tokio::test]
async fn test_notifier_failure_leaves_no_marker_and_retries() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "pay invoice", now + Duration::minutes(50)).await;

    let notifier = Arc::new(RecordingNotifier::default());
    notifier.failing.store(true, Ordering::SeqCst);
    let dispatcher = ReminderDispatcher::new(repo.clone(), notifier.clone(), &thresholds());

    let report = dispatcher.dispatch_due(now, &thresholds()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(reload(&repo, &task).await.last_reminder_threshold, None);

    notifier.failing.store(false, Ordering::SeqCst);
    let retry = dispatcher
        .dispatch_due(now + Duration::minutes(5), &thresholds())
        .await
        .unwrap();
    assert_eq!(retry.applied, 1);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(reload(&repo, &task).await.last_reminder_threshold, Some(HOUR as i64));
}

#[tokio::test]
async fn test_no_reminders_for_terminal_or_overdue_tasks() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let done = create_task(&repo, "done", now + Duration::hours(2)).await;
    complete_task(repo.as_ref(), done.id, now).await.unwrap();
    create_task(&repo, "overdue", now - Duration::minutes(1)).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = ReminderDispatcher::new(repo.clone(), notifier.clone(), &thresholds());
    let report = dispatcher.dispatch_due(now, &thresholds()).await.unwrap();

    assert_eq!(report.candidates, 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_reminder_plan_sends_nothing() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    create_task(&repo, "soon", now + Duration::hours(5)).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = ReminderDispatcher::new(repo.clone(), notifier.clone(), &thresholds());
    let report = dispatcher.dry_run(now).await.unwrap();

    assert_eq!(report.changes.len(), 1);
    assert!(notifier.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_retention_purges_only_old_terminal_tasks() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let horizon = StdDuration::from_secs(30 * 24 * HOUR);

    let old_done = create_task(&repo, "old done", now - Duration::days(45)).await;
    complete_task(repo.as_ref(), old_done.id, now - Duration::days(40)).await.unwrap();
    let old_failed = create_task(&repo, "old failed", now - Duration::days(45)).await;
    fail_task(repo.as_ref(), old_failed.id, now - Duration::days(31)).await.unwrap();
    let recent_done = create_task(&repo, "recent", now - Duration::days(2)).await;
    complete_task(repo.as_ref(), recent_done.id, now - Duration::days(1)).await.unwrap();
    let old_ongoing = create_task(&repo, "still open", now - Duration::days(60)).await;

    let cleaner = RetentionCleaner::new(repo.clone(), horizon);
    let report = cleaner.purge_expired(now, horizon).await.unwrap();
    assert_eq!(report.applied, 2);

    assert!(repo.find_task_by_id(old_done.id).await.unwrap().is_none());
    assert!(repo.find_task_by_id(old_failed.id).await.unwrap().is_none());
    assert!(repo.find_task_by_id(recent_done.id).await.unwrap().is_some());
    assert!(repo.find_task_by_id(old_ongoing.id).await.unwrap().is_some());

    let again = cleaner.purge_expired(now, horizon).await.unwrap();
    assert_eq!(again.applied, 0);
    assert_eq!(again.candidates, 0);
}

#[tokio::test]
async fn test_conditional_delete_respects_predicates() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "open", now).await;

    // Ongoing tasks do not match a terminal-only expectation.
    assert!(!repo.delete_task_if(task.id, &TaskFilter::terminal()).await.unwrap());
    assert!(repo.find_task_by_id(task.id).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Out-of-range values
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_overflowing_estimate_is_skipped_and_others_still_generate() {
    let (repo, pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    // Due earlier, so it is visited first in the pass.
    let broken = create_template(&repo, "broken", RecurrencePattern::Daily, now - Duration::hours(2)).await;
    let healthy = create_template(&repo, "healthy", RecurrencePattern::Daily, now - Duration::hours(1)).await;

    sqlx::query("UPDATE recurrence_templates SET estimated_duration = $1 WHERE id = $2")
        .bind(i64::MAX)
        .bind(broken.id)
        .execute(&pool)
        .await
        .unwrap();

    let report = RecurringGenerator::new(repo.clone()).generate_due(now).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 1);

    let healthy_tasks = repo.find_tasks(&TaskFilter::default().template(healthy.id)).await.unwrap();
    assert_eq!(healthy_tasks.len(), 1);
    let broken = repo.find_template_by_id(broken.id).await.unwrap().unwrap();
    assert_eq!(broken.next_due_at, now - Duration::hours(2));
}

#[tokio::test]
async fn test_estimate_upper_bound_is_enforced_on_write() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();

    let mut data = NewTemplateData::new("huge", RecurrencePattern::Weekly, now);
    data.estimated_duration = MAX_ESTIMATED_DURATION + 1;
    assert!(matches!(repo.create_template(data).await, Err(CoreError::InvalidInput(_))));

    let template = create_template(&repo, "normal", RecurrencePattern::Weekly, now).await;
    let update = TemplateUpdate {
        estimated_duration: Some(i64::MAX),
        ..Default::default()
    };
    assert!(matches!(
        repo.update_template(template.id, template.next_due_at, update).await,
        Err(CoreError::InvalidInput(_))
    ));

    let mut task = NewTaskData::new("long haul", now);
    task.estimated_duration = i64::MAX;
    assert!(matches!(repo.create_task(task).await, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_unrepresentable_horizons_fail_without_panicking() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    create_task(&repo, "soon", now + Duration::minutes(10)).await;
    let huge = StdDuration::from_secs(10_000_000_000_000);

    let cleaner = RetentionCleaner::new(repo.clone(), huge);
    assert!(matches!(cleaner.purge_expired(now, huge).await, Err(CoreError::Config(_))));

    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = ReminderDispatcher::new(repo.clone(), notifier.clone(), &[huge]);
    assert!(matches!(dispatcher.dispatch_due(now, &[huge]).await, Err(CoreError::Config(_))));
    assert!(notifier.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Races between a job's read and its conditional write
// ---------------------------------------------------------------------------

enum Interference {
    Complete { id: uuid::Uuid, at: DateTime<Utc> },
    RecordReminder { id: uuid::Uuid, threshold_secs: i64, at: DateTime<Utc> },
}

/// Store wrapper that lets a competing writer act right after the next
/// candidate scan, before the job applies its conditional update.
struct RacingRepository {
    inner: Arc<SqliteRepository>,
    pending: Mutex<Option<Interference>>,
}

impl RacingRepository {
    fn new(inner: Arc<SqliteRepository>, interference: Interference) -> Arc<Self> {
        Arc::new(Self {
            inner,
            pending: Mutex::new(Some(interference)),
        })
    }
}

#[async_trait]
impl TaskRepository for RacingRepository {
    async fn create_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        self.inner.create_task(data).await
    }

    async fn find_task_by_id(&self, id: uuid::Uuid) -> Result<Option<Task>, CoreError> {
        self.inner.find_task_by_id(id).await
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, CoreError> {
        let tasks = self.inner.find_tasks(filter).await?;
        let pending = self.pending.lock().unwrap().take();
        match pending {
            Some(Interference::Complete { id, at }) => {
                complete_task(self.inner.as_ref(), id, at).await?;
            }
            Some(Interference::RecordReminder { id, threshold_secs, at }) => {
                let changes = TaskChanges::at(at).reminder(threshold_secs, at);
                assert!(self.inner.conditional_update(id, &TaskFilter::ongoing(), &changes).await?);
            }
            None => {}
        }
        Ok(tasks)
    }

    async fn find_tasks_by_short_id_prefix(&self, short_id: &str) -> Result<Vec<Task>, CoreError> {
        self.inner.find_tasks_by_short_id_prefix(short_id).await
    }

    async fn conditional_update(
        &self,
        id: uuid::Uuid,
        expected: &TaskFilter,
        changes: &TaskChanges,
    ) -> Result<bool, CoreError> {
        self.inner.conditional_update(id, expected, changes).await
    }

    async fn delete_task(&self, id: uuid::Uuid) -> Result<bool, CoreError> {
        self.inner.delete_task(id).await
    }

    async fn delete_task_if(&self, id: uuid::Uuid, expected: &TaskFilter) -> Result<bool, CoreError> {
        self.inner.delete_task_if(id, expected).await
    }
}

#[tokio::test]
async fn test_task_completed_mid_pass_is_skipped_by_detector() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "finished just in time", now - Duration::hours(1)).await;

    let racing = RacingRepository::new(
        repo.clone(),
        Interference::Complete { id: task.id, at: now - Duration::minutes(1) },
    );
    let report = OverdueDetector::new(racing).run(now).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped, 1);

    let task = reload(&repo, &task).await;
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.updated_at, now - Duration::minutes(1));
}

#[tokio::test]
async fn test_reminder_marker_advanced_elsewhere_is_skipped() {
    let (repo, _pool, _temp_dir) = setup_test_db().await;
    let now = fixed_now();
    let task = create_task(&repo, "rotate keys", now + Duration::minutes(30)).await;
    let other_sent_at = now - Duration::seconds(5);

    let racing = RacingRepository::new(
        repo.clone(),
        Interference::RecordReminder { id: task.id, threshold_secs: HOUR as i64, at: other_sent_at },
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = ReminderDispatcher::new(racing, notifier.clone(), &thresholds());

    let report = dispatcher.dispatch_due(now, &thresholds()).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped, 1);

    let task = reload(&repo, &task).await;
    assert_eq!(task.last_reminder_threshold, Some(HOUR as i64));
    assert_eq!(task.last_reminder_sent_at, Some(other_sent_at));
}
