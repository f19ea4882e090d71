//! Run reporters
//!
//! A reporter renders the events of a run. [`select`] picks one of the three
//! implementations from the resolved flags and the terminal context.

mod mini;
mod tap;
mod verbose;

use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::engine::{RunPlan, RunStats, StateChange};
use crate::utils::{plural, to_slash};

pub use mini::MiniReporter;
pub use tap::TapReporter;
pub use verbose::VerboseReporter;

/// Output sink of a reporter
pub type Stream = Box<dyn Write + Send>;

/// Renders run events
pub trait Reporter: Send {
    fn start_run(&mut self, plan: &RunPlan);

    fn state_change(&mut self, change: &StateChange);

    fn end_run(&mut self);

    /// Watch mode noticed changes and is about to re-run
    fn files_changed(&mut self, _files: &[PathBuf]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterKind {
    Tap,
    Verbose,
    Mini,
}

/// What the reporter choice depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReporterContext {
    pub tap: bool,
    pub verbose: bool,
    pub watching: bool,
    pub debugging: bool,
    pub ci: bool,
    /// Standard output is an interactive terminal
    pub interactive: bool,
}

/// Choose a reporter, in priority order
pub fn select(context: &ReporterContext) -> ReporterKind {
    if context.tap && !context.watching && !context.debugging {
        ReporterKind::Tap
    } else if context.debugging || context.verbose || context.ci || !context.interactive {
        ReporterKind::Verbose
    } else {
        ReporterKind::Mini
    }
}

pub struct ReporterOptions {
    pub project_dir: PathBuf,
    /// Structured report output
    pub report_stream: Stream,
    /// Worker output passthrough
    pub std_stream: Stream,
    pub watching: bool,
}

impl ReporterOptions {
    /// Reports on stdout, worker output on stderr
    pub fn standard(project_dir: PathBuf, watching: bool) -> Self {
        Self {
            project_dir,
            report_stream: Box::new(std::io::stdout()),
            std_stream: Box::new(std::io::stderr()),
            watching,
        }
    }
}

pub fn build(kind: ReporterKind, options: ReporterOptions) -> Box<dyn Reporter> {
    match kind {
        ReporterKind::Tap => Box::new(TapReporter::new(options)),
        ReporterKind::Verbose => Box::new(VerboseReporter::new(options)),
        ReporterKind::Mini => Box::new(MiniReporter::new(options)),
    }
}

/// Strip the project directory from worker output so paths read relative
fn clean_output(line: &str, project_dir: &Path) -> String {
    let prefix = format!("{}/", to_slash(project_dir));
    line.replace(&prefix, "")
}

/// Closing summary shared by the human-readable reporters
fn summary(plan: Option<&RunPlan>, stats: &RunStats) -> Vec<String> {
    let Some(plan) = plan else {
        return Vec::new();
    };

    if plan.empty_parallel_run {
        return vec![format!("{} No files tested in this parallel run", "✔".green())];
    }
    if plan.files.is_empty() {
        return vec![format!("{} Couldn't find any files to test", "✘".red())];
    }
    if plan.matching && stats.selected_tests == 0 && stats.files_run > 0 {
        return vec![format!("{} Couldn't find any matching tests", "✘".red())];
    }

    let mut lines = Vec::new();
    if stats.failed_tests > 0 {
        lines.push(format!("{} failed", plural(stats.failed_tests, "test")).red().to_string());
    }
    if stats.passed_tests > 0 {
        lines.push(format!("{} passed", plural(stats.passed_tests, "test")).green().to_string());
    }
    if stats.skipped_tests > 0 {
        lines.push(format!("{} skipped", plural(stats.skipped_tests, "test")).yellow().to_string());
    }
    if stats.timeouts > 0 {
        lines.push(format!("{} timed out", plural(stats.timeouts, "test file")).red().to_string());
    }
    if stats.failed_workers > 0 {
        lines.push(
            format!("{} exited with a non-zero exit code", plural(stats.failed_workers, "test file"))
                .red()
                .to_string(),
        );
    }
    if stats.internal_errors > 0 {
        lines.push(
            format!("{} could not be run", plural(stats.internal_errors, "test file"))
                .red()
                .to_string(),
        );
    }
    if stats.skipped_files > 0 {
        lines.push(
            format!(
                "{} not run due to --fail-fast",
                plural(stats.skipped_files, "test file")
            )
            .yellow()
            .to_string(),
        );
    }
    lines
}


#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ReporterContext {
        ReporterContext {
            interactive: true,
            ..ReporterContext::default()
        }
    }

    #[test]
    fn test_interactive_default_is_mini() {
        assert_eq!(select(&context()), ReporterKind::Mini);
    }

    #[test]
    fn test_tap_unless_watching_or_debugging() {
        let tap = ReporterContext {
            tap: true,
            ..context()
        };
        assert_eq!(select(&tap), ReporterKind::Tap);
        assert_eq!(
            select(&ReporterContext {
                watching: true,
                ..tap
            }),
            ReporterKind::Mini
        );
        assert_eq!(
            select(&ReporterContext {
                debugging: true,
                ..tap
            }),
            ReporterKind::Verbose
        );
    }

    #[test]
    fn test_verbose_conditions() {
        for ctx in [
            ReporterContext {
                verbose: true,
                ..context()
            },
            ReporterContext {
                ci: true,
                ..context()
            },
            ReporterContext {
                interactive: false,
                ..context()
            },
        ] {
            assert_eq!(select(&ctx), ReporterKind::Verbose);
        }
    }

    #[test]
    fn test_clean_output() {
        assert_eq!(
            clean_output("at /project/test/a.js:3:5", Path::new("/project")),
            "at test/a.js:3:5"
        );
    }

    #[test]
    fn test_summary_without_files() {
        colored::control::set_override(false);
        let plan = RunPlan {
            files: Vec::new(),
            debug: false,
            matching: false,
            update_snapshots: false,
            first_run: true,
            empty_parallel_run: false,
        };
        assert_eq!(
            summary(Some(&plan), &RunStats::default()),
            vec!["✘ Couldn't find any files to test"]
        );
    }
}
