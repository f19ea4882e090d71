//! Watch mode
//!
//! Re-runs tests when files in the project change, or when asked to on
//! standard input.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::engine::{RunRequest, StateChange};
use crate::error::Fatal;
use crate::orchestrator::{Drive, Session};
use crate::prepare::Globs;
use crate::providers::Providers;

/// What a batch of changes calls for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rerun {
    Skip,
    All,
    /// Only these project-relative test files
    Files(Vec<PathBuf>),
}

/// Decide what to re-run for a batch of project-relative changed paths
pub fn classify_changes(changed: &[PathBuf], globs: &Globs, providers: &Providers) -> Rerun {
    let relevant: Vec<&PathBuf> = changed
        .iter()
        .filter(|path| !globs.is_ignored_by_watcher(path) && !providers.ignore_change(path))
        .collect();

    if relevant.is_empty() {
        Rerun::Skip
    } else if relevant.iter().all(|path| globs.is_test_file(path)) {
        Rerun::Files(relevant.into_iter().cloned().collect())
    } else {
        Rerun::All
    }
}

/// Interactive commands read from standard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Rerun,
    UpdateSnapshots,
}

impl Input {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "r" | "rs" => Some(Input::Rerun),
            "u" => Some(Input::UpdateSnapshots),
            _ => None,
        }
    }
}

pub struct Watcher {
    project_dir: PathBuf,
    globs: Globs,
    providers: Providers,
}

impl Watcher {
    pub fn new(project_dir: PathBuf, globs: Globs, providers: Providers) -> Self {
        Self {
            project_dir,
            globs,
            providers,
        }
    }

    /// Run, then re-run on every trigger until interrupted
    pub async fn run(self, session: &mut Session) -> Result<u8, Fatal> {
        let (changes_tx, mut changes) = mpsc::unbounded_channel();
        let _debouncer = self.watch(changes_tx).map_err(Fatal::Engine)?;
        let mut inputs = spawn_input_reader();

        let mut next = Some(RunRequest {
            first_run: true,
            ..RunRequest::default()
        });

        loop {
            if let Some(request) = next.take() {
                if let Drive::Interrupted = session.drive(request).await? {
                    return Ok(1);
                }
            }

            tokio::select! {
                Some(paths) = changes.recv() => {
                    let changed = self.relativize(paths);
                    match classify_changes(&changed, &self.globs, &self.providers) {
                        Rerun::Skip => debug!("Ignoring {} changed paths", changed.len()),
                        Rerun::All => {
                            session.reporter().files_changed(&changed);
                            next = Some(RunRequest::default());
                        }
                        Rerun::Files(files) => {
                            session.reporter().files_changed(&files);
                            next = Some(RunRequest {
                                files: Some(files),
                                ..RunRequest::default()
                            });
                        }
                    }
                }
                Some(input) = inputs.recv() => {
                    next = Some(RunRequest {
                        update_snapshots: input == Input::UpdateSnapshots,
                        ..RunRequest::default()
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    let reporter = session.reporter();
                    reporter.state_change(&StateChange::Interrupt);
                    reporter.end_run();
                    return Ok(1);
                }
            }
        }
    }

    /// Start watching the project directory
    fn watch(
        &self,
        changes: mpsc::UnboundedSender<Vec<PathBuf>>,
    ) -> Result<Debouncer<RecommendedWatcher>> {
        let mut debouncer = new_debouncer(
            Duration::from_millis(100),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let paths = events.into_iter().map(|event| event.path).collect();
                    let _ = changes.send(paths);
                }
                Err(err) => error!("Watch error: {:?}", err),
            },
        )?;

        debouncer
            .watcher()
            .watch(&self.project_dir, RecursiveMode::Recursive)?;
        debug!("Watching {}", self.project_dir.display());

        Ok(debouncer)
    }

    /// Project-relative changed files, without directories or duplicates
    fn relativize(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        let canonical = self.project_dir.canonicalize().ok();
        let mut relative: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| !path.is_dir())
            .filter_map(|path| {
                path.strip_prefix(&self.project_dir)
                    .ok()
                    .or_else(|| path.strip_prefix(canonical.as_deref()?).ok())
                    .map(Path::to_path_buf)
            })
            .collect();
        relative.sort();
        relative.dedup();
        relative
    }
}

fn spawn_input_reader() -> mpsc::UnboundedReceiver<Input> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(input) = Input::parse(&line) {
                if tx.send(input).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistedConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn globs() -> Globs {
        let extensions = vec!["js".to_string()];
        Globs::build(None, Some(&json!(["docs/**"])), &extensions, &Providers::default()).unwrap()
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_changed_test_files_rerun_alone() {
        let rerun = classify_changes(&paths(&["test/a.js", "test/b.js"]), &globs(), &Providers::default());
        assert_eq!(rerun, Rerun::Files(paths(&["test/a.js", "test/b.js"])));
    }

    #[test]
    fn test_source_change_reruns_everything() {
        let rerun = classify_changes(&paths(&["test/a.js", "lib/index.js"]), &globs(), &Providers::default());
        assert_eq!(rerun, Rerun::All);
    }

    #[test]
    fn test_ignored_changes_are_skipped() {
        let rerun = classify_changes(
            &paths(&["docs/readme.md", "test/snapshots/a.js.snap"]),
            &globs(),
            &Providers::default(),
        );
        assert_eq!(rerun, Rerun::Skip);
    }

    #[test]
    fn test_provider_can_ignore_changes() {
        let dir = TempDir::new().unwrap();
        let config = PersistedConfig {
            typescript: Some(json!({"rewritePaths": {"src/": "build/"}})),
            ..PersistedConfig::default()
        };
        let providers = Providers::load(dir.path(), &config).unwrap();

        assert_eq!(
            classify_changes(&paths(&["src/index.ts"]), &globs(), &providers),
            Rerun::Skip
        );
    }

    #[test]
    fn test_input_commands() {
        assert_eq!(Input::parse("r\n"), Some(Input::Rerun));
        assert_eq!(Input::parse("rs"), Some(Input::Rerun));
        assert_eq!(Input::parse(" u "), Some(Input::UpdateSnapshots));
        assert_eq!(Input::parse("quit"), None);
    }

    #[test]
    fn test_relativize_drops_outside_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("test")).unwrap();
        let watcher = Watcher::new(dir.path().to_path_buf(), globs(), Providers::default());

        let changed = watcher.relativize(vec![
            dir.path().join("test/a.js"),
            dir.path().join("test/a.js"),
            dir.path().join("test"),
            PathBuf::from("/elsewhere/b.js"),
        ]);
        assert_eq!(changed, paths(&["test/a.js"]));
    }
}
