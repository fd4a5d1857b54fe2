use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// Test harness for running CLI commands against a temporary database
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
    outbox_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let outbox_path = temp_dir.path().join("outbox.jsonl");

        Self {
            temp_dir,
            db_path,
            outbox_path,
        }
    }

    /// A `cadence` invocation isolated in the temp directory
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cadence").expect("Failed to find cadence binary");
        cmd.current_dir(self.temp_dir.path());
        cmd.env("CADENCE_DATABASE_PATH", &self.db_path);
        cmd.env("CADENCE_NOTIFIER__OUTBOX_PATH", &self.outbox_path);
        cmd.env("CADENCE_DEFAULT_TIMEZONE", "UTC");
        cmd.env("RUST_LOG", "warn");
        cmd
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Run a command that must succeed and return its stdout
    pub fn stdout_of(&self, args: &[&str]) -> String {
        let output = self.run_success(args).get_output().stdout.clone();
        String::from_utf8(output).expect("stdout should be UTF-8")
    }

    /// Lines appended to the reminder outbox so far
    pub fn outbox_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.outbox_path)
            .map(|contents| contents.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// First hyphenated UUID in `output`, ignoring any color codes around it
pub fn extract_uuid(output: &str) -> Option<Uuid> {
    (0..output.len().saturating_sub(35))
        .filter(|&i| output.is_char_boundary(i) && output.is_char_boundary(i + 36))
        .find_map(|i| Uuid::parse_str(&output[i..i + 36]).ok())
}

/// Common test fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub fn overdue_task_args(title: &str) -> Vec<&str> {
        vec!["task", "add", title, "--due", "2020-01-01T00:00:00Z"]
    }
}
