use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;

use super::{clean_output, summary, ReporterOptions, Reporter, Stream};
use crate::engine::{FileResult, Outcome, RunPlan, RunStats, StateChange};
use crate::utils::{format_duration, plural, to_slash};

/// One line per test file, suited to logs and CI
pub struct VerboseReporter {
    project_dir: PathBuf,
    report: Stream,
    std: Stream,
    watching: bool,
    plan: Option<RunPlan>,
    stats: RunStats,
}

impl VerboseReporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            project_dir: options.project_dir,
            report: options.report_stream,
            std: options.std_stream,
            watching: options.watching,
            plan: None,
            stats: RunStats::default(),
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.report, "{}", text.as_ref());
    }

    fn finished(&mut self, result: &FileResult) {
        self.stats.record(result);

        let file = to_slash(&result.file);
        let text = match &result.outcome {
            Outcome::Passed => format!(
                "  {} {} {}",
                "✔".green(),
                file,
                format!("({})", format_duration(result.duration)).dimmed()
            ),
            Outcome::Failed { exit_code } if result.counts.failed > 0 => format!(
                "  {} {} {}",
                "✘".red(),
                file,
                format!(
                    "{} failed{}",
                    plural(result.counts.failed, "test"),
                    exit_code
                        .map(|code| format!(", exit code {}", code))
                        .unwrap_or_default()
                )
                .dimmed()
            ),
            Outcome::Failed { exit_code: Some(code) } => format!(
                "  {} {} exited with a non-zero exit code: {}",
                "✘".red(),
                file,
                code
            ),
            Outcome::Failed { exit_code: None } => {
                format!("  {} {} was terminated by a signal", "✘".red(), file)
            }
            Outcome::TimedOut(limit) => format!(
                "  {} {} timed out after {}",
                "✘".red(),
                file,
                format_duration(*limit)
            ),
            Outcome::Errored(message) => {
                format!("  {} {} could not be run: {}", "✘".red(), file, message)
            }
        };
        self.line(text);
    }
}

impl Reporter for VerboseReporter {
    fn start_run(&mut self, plan: &RunPlan) {
        if self.watching && !plan.first_run {
            self.line(format!("\n{}\n", "─".repeat(40).dimmed()));
        }
        if plan.update_snapshots && !plan.first_run {
            self.line(format!("  {}", "Updating snapshots".yellow()));
        }
        self.stats = RunStats::default();
        self.plan = Some(plan.clone());
        self.line("");
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
                self.line(format!("\n  {} Exiting due to SIGINT", "✘".red()));
            }
        }
    }

    fn end_run(&mut self) {
        let lines = summary(self.plan.as_ref(), &self.stats);
        self.line("");
        for text in lines {
            self.line(format!("  {}", text));
        }
        if self.watching {
            self.line(format!(
                "\n  {}",
                "Watching for changes. Type `r` and Enter to re-run, `u` to update snapshots.".dimmed()
            ));
        }
        self.line("");
        let _ = self.report.flush();
    }

    fn files_changed(&mut self, files: &[PathBuf]) {
        let shown: Vec<String> = files
            .iter()
            .map(|file| display_relative(file, &self.project_dir))
            .collect();
        self.line(format!("  {} {}", "Changed:".dimmed(), shown.join(", ")));
    }
}

fn display_relative(file: &Path, project_dir: &Path) -> String {
    to_slash(file.strip_prefix(project_dir).unwrap_or(file))
}
