use std::io::Write;
use std::path::PathBuf;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::{clean_output, summary, Reporter, ReporterOptions, Stream};
use crate::engine::{FileResult, Outcome, RunPlan, RunStats, StateChange};
use crate::utils::{format_duration, plural, to_slash};

/// Interactive reporter: a live progress line, then failures and totals
pub struct MiniReporter {
    project_dir: PathBuf,
    report: Stream,
    std: Stream,
    watching: bool,
    draw_target: fn() -> ProgressDrawTarget,
    progress: Option<ProgressBar>,
    plan: Option<RunPlan>,
    stats: RunStats,
    failures: Vec<String>,
}

impl MiniReporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            project_dir: options.project_dir,
            report: options.report_stream,
            std: options.std_stream,
            watching: options.watching,
            draw_target: ProgressDrawTarget::stdout,
            progress: None,
            plan: None,
            stats: RunStats::default(),
            failures: Vec::new(),
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.report, "{}", text.as_ref());
    }

    fn status_message(&self) -> String {
        let mut parts = vec![format!("{} passed", self.stats.passed_tests).green().to_string()];
        if self.stats.failed_tests > 0 {
            parts.push(format!("{} failed", self.stats.failed_tests).red().to_string());
        }
        if self.stats.skipped_tests > 0 {
            parts.push(format!("{} skipped", self.stats.skipped_tests).yellow().to_string());
        }
        parts.join(" ")
    }

    fn finished(&mut self, result: &FileResult) {
        self.stats.record(result);

        let file = to_slash(&result.file);
        let failure = match &result.outcome {
            Outcome::Passed => None,
            Outcome::Failed { exit_code: Some(code) } => {
                Some(format!("{} exited with code {}", file, code))
            }
            Outcome::Failed { exit_code: None } => Some(format!("{} was terminated", file)),
            Outcome::TimedOut(limit) => {
                Some(format!("{} timed out after {}", file, format_duration(*limit)))
            }
            Outcome::Errored(message) => Some(format!("{} could not be run: {}", file, message)),
        };
        if let Some(failure) = failure {
            self.failures.push(failure);
        }

        let message = self.status_message();
        if let Some(progress) = &self.progress {
            progress.inc(1);
            progress.set_message(message);
        }
    }
}

impl Reporter for MiniReporter {
    fn start_run(&mut self, plan: &RunPlan) {
        if self.watching && !plan.first_run {
            self.line("");
        }

        let progress = ProgressBar::with_draw_target(Some(plan.files.len() as u64), (self.draw_target)());
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos}/{len} files {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress.enable_steady_tick(std::time::Duration::from_millis(80));

        self.progress = Some(progress);
        self.plan = Some(plan.clone());
        self.stats = RunStats::default();
        self.failures.clear();
    }

    fn state_change(&mut self, change: &StateChange) {
        match change {
            StateChange::WorkerStarted { .. } => {}
            StateChange::WorkerOutput { line, .. } => {
                let cleaned = clean_output(line, &self.project_dir);
                let std = &mut self.std;
                match &self.progress {
                    Some(progress) => progress.suspend(|| {
                        let _ = writeln!(std, "{}", cleaned);
                    }),
                    None => {
                        let _ = writeln!(std, "{}", cleaned);
                    }
                }
            }
            StateChange::WorkerFinished(result) => self.finished(result),
            StateChange::Interrupt => {
                if let Some(progress) = self.progress.take() {
                    progress.finish_and_clear();
                }
                self.line(format!("\n  {} Exiting due to SIGINT", "✘".red()));
            }
        }
    }

    fn end_run(&mut self) {
        if let Some(progress) = self.progress.take() {
            progress.finish_and_clear();
        }

        self.line("");
        let failures = std::mem::take(&mut self.failures);
        for failure in &failures {
            self.line(format!("  {} {}", "✘".red(), failure));
        }
        if !failures.is_empty() {
            self.line("");
        }

        for text in summary(self.plan.as_ref(), &self.stats) {
            self.line(format!("  {}", text));
        }
        if self.watching {
            self.line(format!("\n  {}", "Watching for changes…".dimmed()));
        }
        self.line("");
        let _ = self.report.flush();
    }

    fn files_changed(&mut self, files: &[PathBuf]) {
        if self.watching {
            self.line(format!(
                "  {} {}",
                "↻".yellow(),
                format!("{} changed", plural(files.len(), "file")).dimmed()
            ));
        }
    }
}
