use std::io::Write;
use std::path::PathBuf;

use super::{clean_output, Reporter, ReporterOptions, Stream};
use crate::engine::{FileResult, Outcome, RunPlan, RunStats, StateChange};
use crate::utils::{format_duration, to_slash};

/// TAP version 13 output, one test point per test file
pub struct TapReporter {
    project_dir: PathBuf,
    report: Stream,
    std: Stream,
    plan: Option<RunPlan>,
    stats: RunStats,
    points: usize,
    interrupted: bool,
}

impl TapReporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            project_dir: options.project_dir,
            report: options.report_stream,
            std: options.std_stream,
            plan: None,
            stats: RunStats::default(),
            points: 0,
            interrupted: false,
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.report, "{}", text.as_ref());
    }

    fn point(&mut self, ok: bool, description: &str) {
        self.points += 1;
        let status = if ok { "ok" } else { "not ok" };
        let text = format!("{} {} - {}", status, self.points, description);
        self.line(text);
    }

    fn finished(&mut self, result: &FileResult) {
        self.stats.record(result);
        self.point(result.passed(), &to_slash(&result.file));

        let detail = match &result.outcome {
            Outcome::Passed => return,
            Outcome::Failed { exit_code } => format!(
                "exitCode: {}\n    failed: {}",
                exit_code.map_or_else(|| "null".to_string(), |c| c.to_string()),
                result.counts.failed
            ),
            Outcome::TimedOut(limit) => format!("message: 'Timed out after {}'", format_duration(*limit)),
            Outcome::Errored(message) => format!("message: '{}'", message.replace('\'', "''")),
        };
        self.line(format!("  ---\n    {}\n  ...", detail));
    }
}

impl Reporter for TapReporter {
    fn start_run(&mut self, plan: &RunPlan) {
        self.plan = Some(plan.clone());
        self.stats = RunStats::default();
        self.points = 0;
        self.line("TAP version 13");
    }

    fn state_change(&mut self, change: &StateChange) {
        match change {
            StateChange::WorkerStarted { .. } => {}
            StateChange::WorkerOutput { line, .. } => {
                let cleaned = clean_output(line, &self.project_dir);
                let _ = writeln!(self.std, "{}", cleaned);
            }
            StateChange::WorkerFinished(result) => self.finished(result),
            StateChange::Interrupt => {
                self.interrupted = true;
                self.line("Bail out! Exiting due to SIGINT");
            }
        }
    }

    fn end_run(&mut self) {
        if self.interrupted {
            let _ = self.report.flush();
            return;
        }

        let no_files = self
            .plan
            .as_ref()
            .is_some_and(|plan| plan.files.is_empty() && !plan.empty_parallel_run);
        if no_files {
            self.point(false, "Couldn't find any files to test");
        }

        let stats = self.stats;
        self.line(format!("\n1..{}", self.points));
        self.line(format!("# tests {}", stats.selected_tests));
        self.line(format!("# pass {}", stats.passed_tests));
        if stats.skipped_tests > 0 {
            self.line(format!("# skip {}", stats.skipped_tests));
        }
        self.line(format!(
            "# fail {}",
            stats.failed_tests + stats.failed_workers + stats.timeouts + stats.internal_errors + usize::from(no_files)
        ));
        self.line("");
        let _ = self.report.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TestCounts;
    use crate::reporter::testing::SharedBuffer;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn reporter() -> (TapReporter, SharedBuffer) {
        let report = SharedBuffer::default();
        let reporter = TapReporter::new(ReporterOptions {
            project_dir: PathBuf::from("/project"),
            report_stream: Box::new(report.clone()),
            std_stream: Box::new(SharedBuffer::default()),
            watching: false,
        });
        (reporter, report)
    }

    fn plan(files: &[&str]) -> RunPlan {
        RunPlan {
            files: files.iter().map(PathBuf::from).collect(),
            debug: false,
            matching: false,
            update_snapshots: false,
            first_run: true,
            empty_parallel_run: false,
        }
    }

    #[test]
    fn test_tap_stream() {
        let (mut reporter, report) = reporter();
        reporter.start_run(&plan(&["test/a.js", "test/b.js"]));
        reporter.state_change(&StateChange::WorkerFinished(FileResult {
            file: PathBuf::from("test/a.js"),
            outcome: Outcome::Passed,
            counts: TestCounts::from_exit(true),
            duration: Duration::from_millis(3),
        }));
        reporter.state_change(&StateChange::WorkerFinished(FileResult {
            file: PathBuf::from("test/b.js"),
            outcome: Outcome::Failed { exit_code: Some(1) },
            counts: TestCounts::from_exit(false),
            duration: Duration::from_millis(3),
        }));
        reporter.end_run();

        assert_eq!(
            report.contents(),
            "TAP version 13\n\
             ok 1 - test/a.js\n\
             not ok 2 - test/b.js\n  ---\n    exitCode: 1\n    failed: 1\n  ...\n\
             \n1..2\n# tests 2\n# pass 1\n# fail 1\n\n"
        );
    }

    #[test]
    fn test_no_files() {
        let (mut reporter, report) = reporter();
        reporter.start_run(&plan(&[]));
        reporter.end_run();

        let output = report.contents();
        assert!(output.contains("not ok 1 - Couldn't find any files to test"));
        assert!(output.contains("1..1"));
        assert!(output.contains("# fail 1"));
    }
}
