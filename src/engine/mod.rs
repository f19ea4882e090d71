//! Execution engine interface
//!
//! An engine runs test files and reports its progress as [`RunEvent`]s on a
//! channel handed to it at construction. For each run, `RunStarted` is sent
//! before any `StateChange` of that run.

mod process;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use process::ProcessEngine;

pub type EventSender = mpsc::UnboundedSender<RunEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RunEvent>;

/// Create the channel an engine reports on
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// What to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Project-relative test files; `None` runs every selected file
    pub files: Option<Vec<PathBuf>>,
    /// Update snapshots for this run only
    pub update_snapshots: bool,
    pub first_run: bool,
}

/// Metadata of a run that has begun
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Project-relative test files, in launch order
    pub files: Vec<PathBuf>,
    pub debug: bool,
    /// Whether title patterns were given
    pub matching: bool,
    pub update_snapshots: bool,
    pub first_run: bool,
    /// This job's shard of a parallel CI run holds no files
    pub empty_parallel_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Test counts reported by a worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCounts {
    pub declared: usize,
    pub selected: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TestCounts {
    /// Counts for a worker that reported nothing: the file is one test
    pub fn from_exit(success: bool) -> Self {
        Self {
            declared: 1,
            selected: 1,
            passed: usize::from(success),
            failed: usize::from(!success),
            skipped: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed { exit_code: Option<i32> },
    TimedOut(Duration),
    /// The worker could not be run at all
    Errored(String),
}

/// The result of running one test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub file: PathBuf,
    pub outcome: Outcome,
    pub counts: TestCounts,
    pub duration: Duration,
}

impl FileResult {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    WorkerStarted { file: PathBuf },
    WorkerOutput {
        file: PathBuf,
        stream: OutputStream,
        line: String,
    },
    WorkerFinished(FileResult),
    /// The user asked the run to stop
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    RunStarted(RunPlan),
    StateChange(StateChange),
}

/// Totals over the files of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files_run: usize,
    /// Files not started because of fail-fast
    pub skipped_files: usize,
    pub declared_tests: usize,
    pub selected_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub skipped_tests: usize,
    /// Workers that exited unsuccessfully without failing a test
    pub failed_workers: usize,
    pub timeouts: usize,
    pub internal_errors: usize,
}

impl RunStats {
    pub fn record(&mut self, result: &FileResult) {
        let counts = &result.counts;
        self.files_run += 1;
        self.declared_tests += counts.declared;
        self.selected_tests += counts.selected;
        self.passed_tests += counts.passed;
        self.failed_tests += counts.failed;
        self.skipped_tests += counts.skipped;

        match result.outcome {
            Outcome::Passed => {}
            Outcome::Failed { .. } if counts.failed > 0 => {}
            Outcome::Failed { .. } => self.failed_workers += 1,
            Outcome::TimedOut(_) => self.timeouts += 1,
            Outcome::Errored(_) => self.internal_errors += 1,
        }
    }

    pub fn any_failure(&self) -> bool {
        self.failed_tests > 0 || self.failed_workers > 0 || self.timeouts > 0 || self.internal_errors > 0
    }
}

/// Final state of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub stats: RunStats,
    pub empty_parallel_run: bool,
    pub interrupted: bool,
}

impl RunStatus {
    /// Exit code for this run; `matching` is whether title patterns were given
    pub fn suggest_exit_code(&self, matching: bool) -> u8 {
        if self.empty_parallel_run {
            return 0;
        }
        if matching && self.stats.selected_tests == 0 {
            return 1;
        }
        if self.interrupted || self.stats.declared_tests == 0 || self.stats.any_failure() {
            return 1;
        }
        0
    }
}

/// Runs test files
#[async_trait]
pub trait Engine: Send + Sync {
    async fn run(&self, request: RunRequest) -> Result<RunStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Outcome, counts: TestCounts) -> FileResult {
        FileResult {
            file: PathBuf::from("test/a.js"),
            outcome,
            counts,
            duration: Duration::from_millis(5),
        }
    }

    fn status(results: &[FileResult]) -> RunStatus {
        let mut status = RunStatus::default();
        for r in results {
            status.stats.record(r);
        }
        status
    }

    #[test]
    fn test_passing_run_exits_zero() {
        let status = status(&[result(Outcome::Passed, TestCounts::from_exit(true))]);
        assert_eq!(status.suggest_exit_code(false), 0);
    }

    #[test]
    fn test_no_files_exits_one() {
        assert_eq!(RunStatus::default().suggest_exit_code(false), 1);
    }

    #[test]
    fn test_empty_parallel_run_exits_zero() {
        let status = RunStatus {
            empty_parallel_run: true,
            ..RunStatus::default()
        };
        assert_eq!(status.suggest_exit_code(true), 0);
    }

    #[test]
    fn test_matching_without_selected_tests() {
        let counts = TestCounts {
            declared: 3,
            ..TestCounts::default()
        };
        let status = status(&[result(Outcome::Passed, counts)]);
        assert_eq!(status.suggest_exit_code(false), 0);
        assert_eq!(status.suggest_exit_code(true), 1);
    }

    #[test]
    fn test_failures_exit_one() {
        let failed_test = result(
            Outcome::Failed { exit_code: Some(1) },
            TestCounts::from_exit(false),
        );
        let crashed = result(
            Outcome::Failed { exit_code: None },
            TestCounts {
                declared: 2,
                selected: 2,
                passed: 2,
                ..TestCounts::default()
            },
        );
        let timed_out = result(Outcome::TimedOut(Duration::from_secs(10)), TestCounts::default());

        let stats = status(&[failed_test.clone(), crashed, timed_out]).stats;
        assert_eq!(stats.failed_tests, 1);
        assert_eq!(stats.failed_workers, 1);
        assert_eq!(stats.timeouts, 1);

        assert_eq!(status(&[failed_test]).suggest_exit_code(false), 1);
    }

    #[test]
    fn test_worker_report_parses_partially() {
        let counts: TestCounts = serde_json::from_str(r#"{"declared": 4, "passed": 4}"#).unwrap();
        assert_eq!(counts.declared, 4);
        assert_eq!(counts.selected, 0);
    }
}
