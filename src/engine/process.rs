//! Runs each test file in its own `node` process

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::{
    Engine, EventSender, FileResult, Outcome, OutputStream, RunEvent, RunPlan, RunRequest,
    RunStatus, StateChange, TestCounts,
};
use crate::ci::ParallelRuns;
use crate::config::{cache_dir, CanonicalConfig};
use crate::mode::DebugOptions;
use crate::prepare::{FilePattern, Prepared};
use crate::utils::to_slash;

/// Environment variable carrying the JSON worker options
pub const WORKER_OPTIONS_ENV: &str = "TRIAL_WORKER_OPTIONS";

/// Prefix of the stdout line a worker uses to report its test counts
pub const REPORT_PREFIX: &str = "trial:report ";

/// A test file chosen for this run
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    file: PathBuf,
    line_numbers: Vec<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkerOptions<'a> {
    file: &'a Path,
    project_dir: &'a Path,
    #[serde(rename = "match")]
    match_patterns: &'a [String],
    line_numbers: &'a [u32],
    fail_fast: bool,
    fail_without_assertions: bool,
    serial: bool,
    update_snapshots: bool,
    snapshot_dir: Option<&'a Path>,
    cache_dir: Option<PathBuf>,
    require: &'a [String],
    providers: Vec<Value>,
    experiments: &'a BTreeMap<String, Value>,
    color: bool,
    debug: Option<&'a DebugOptions>,
}

/// Everything one worker process needs
struct Launch {
    node: PathBuf,
    project_dir: PathBuf,
    file: PathBuf,
    load_path: PathBuf,
    node_arguments: Vec<String>,
    worker_argv: Vec<String>,
    environment_variables: BTreeMap<String, String>,
    options: String,
    timeout: Option<Duration>,
    events: EventSender,
}

pub struct ProcessEngine {
    config: Arc<CanonicalConfig>,
    prepared: Arc<Prepared>,
    debug: Option<DebugOptions>,
    events: EventSender,
}

impl ProcessEngine {
    pub fn new(
        config: Arc<CanonicalConfig>,
        prepared: Arc<Prepared>,
        debug: Option<DebugOptions>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            prepared,
            debug,
            events,
        }
    }

    fn emit(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }

    /// Number of files run at the same time
    fn concurrency(&self) -> usize {
        if self.debug.is_some() || self.config.serial {
            1
        } else if self.config.concurrency == 0 {
            num_cpus::get()
        } else {
            self.config.concurrency
        }
    }

    /// Every test file in the project, sorted
    fn discover(&self) -> Vec<PathBuf> {
        let root = &self.config.project_dir;
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(entry))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
            .filter(|relative| self.prepared.globs.is_test_file(relative))
            .collect();
        files.sort();

        debug!("Discovered {} test files", files.len());
        files
    }

    fn launch(&self, node: &Path, selection: &Selection, update_snapshots: bool) -> Result<Launch> {
        let config = &self.config;
        let load_path = self
            .prepared
            .providers
            .resolve_test_file(&selection.file)
            .unwrap_or_else(|| selection.file.clone());

        let options = WorkerOptions {
            file: &selection.file,
            project_dir: &config.project_dir,
            match_patterns: &config.match_patterns,
            line_numbers: &selection.line_numbers,
            fail_fast: config.fail_fast,
            fail_without_assertions: config.fail_without_assertions,
            serial: config.serial,
            update_snapshots,
            snapshot_dir: config.snapshot_dir.as_deref(),
            cache_dir: config
                .cache_enabled
                .then(|| cache_dir(&config.project_dir)),
            require: &config.require,
            providers: self.prepared.providers.worker_options(),
            experiments: &config.experiments,
            color: config.color.enabled(),
            debug: self.debug.as_ref(),
        };

        let mut node_arguments = config.node_arguments.clone();
        if let Some(debug) = &self.debug {
            node_arguments.push(debug.inspect_flag());
        }

        Ok(Launch {
            node: node.to_path_buf(),
            project_dir: config.project_dir.clone(),
            file: selection.file.clone(),
            load_path,
            node_arguments,
            worker_argv: config.worker_argv.clone(),
            environment_variables: config.environment_variables.clone(),
            options: serde_json::to_string(&options).context("Failed to encode worker options")?,
            timeout: self.debug.is_none().then_some(config.timeout.duration),
            events: self.events.clone(),
        })
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn run(&self, request: RunRequest) -> Result<RunStatus> {
        self.prepared.providers.compile().await?;

        let specific = request.files.is_some();
        let candidates = match request.files {
            Some(files) => files,
            None => self.discover(),
        };
        let mut selected = select_files(candidates, &self.prepared.filter)?;

        let mut status = RunStatus::default();
        if let (false, Some(parallel)) = (specific, self.prepared.parallel_runs) {
            selected = shard(selected, parallel);
            status.empty_parallel_run = selected.is_empty();
        }

        // A debug run targets exactly one file; anything else is reported
        // by the caller from the plan, without launching workers.
        let launchable = match self.debug {
            Some(_) => selected.len() == 1,
            None => !selected.is_empty(),
        };
        let node = if launchable {
            Some(which::which("node").context("Could not find `node` on the PATH")?)
        } else {
            None
        };

        let update_snapshots = request.update_snapshots || self.config.update_snapshots;
        self.emit(RunEvent::RunStarted(RunPlan {
            files: selected.iter().map(|s| s.file.clone()).collect(),
            debug: self.debug.is_some(),
            matching: !self.config.match_patterns.is_empty(),
            update_snapshots,
            first_run: request.first_run,
            empty_parallel_run: status.empty_parallel_run,
        }));

        let Some(node) = node else {
            return Ok(status);
        };

        let limit = self.concurrency();
        info!("Running {} files, {} at a time", selected.len(), limit);

        let semaphore = Arc::new(Semaphore::new(limit));
        let bail = Arc::new(AtomicBool::new(false));
        let fail_fast = self.config.fail_fast;
        let mut tasks = JoinSet::new();

        for selection in &selected {
            let launch = self.launch(&node, selection, update_snapshots)?;
            let semaphore = semaphore.clone();
            let bail = bail.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if bail.load(Ordering::SeqCst) {
                    return None;
                }
                let result = run_worker(launch).await;
                if fail_fast && !result.passed() {
                    bail.store(true, Ordering::SeqCst);
                }
                Some(result)
            });
        }

        let stats = &mut status.stats;
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Some(result)) => stats.record(&result),
                    Ok(None) => stats.skipped_files += 1,
                    Err(err) => {
                        warn!("Worker task failed: {}", err);
                        stats.internal_errors += 1;
                    }
                }
            }
        };

        let mut interrupted = false;
        tokio::select! {
            _ = collect => {}
            _ = tokio::signal::ctrl_c() => interrupted = true,
        }

        if interrupted {
            self.emit(RunEvent::StateChange(StateChange::Interrupt));
            status.interrupted = true;
        }
        Ok(status)
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == "node_modules" || name.starts_with('.'))
}

/// Keep the files matched by the positional patterns
///
/// A pattern matches a file exactly, a directory containing it, or as a
/// glob. Line numbers come from the first matching pattern.
fn select_files(files: Vec<PathBuf>, filter: &[FilePattern]) -> Result<Vec<Selection>> {
    if filter.is_empty() {
        return Ok(files
            .into_iter()
            .map(|file| Selection {
                file,
                line_numbers: Vec::new(),
            })
            .collect());
    }

    let matchers = filter
        .iter()
        .map(|pattern| Ok((pattern, glob_matcher(pattern)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(files
        .into_iter()
        .filter_map(|file| {
            let relative = to_slash(&file);
            let (pattern, _) = matchers.iter().find(|(pattern, matcher)| {
                relative == pattern.pattern
                    || relative.starts_with(&format!("{}/", pattern.pattern))
                    || matcher.as_ref().is_some_and(|m| m.is_match(&relative))
            })?;
            Some(Selection {
                file,
                line_numbers: pattern.line_numbers.clone(),
            })
        })
        .collect())
}

fn glob_matcher(pattern: &FilePattern) -> Result<Option<GlobMatcher>> {
    if !pattern.has_glob() {
        return Ok(None);
    }
    let glob = GlobBuilder::new(&pattern.pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid file pattern '{}'", pattern.pattern))?;
    Ok(Some(glob.compile_matcher()))
}

/// This job's contiguous share of the sorted files
///
/// The first `len % total` jobs take one extra file, so shares differ by at
/// most one.
fn shard<T>(files: Vec<T>, parallel: ParallelRuns) -> Vec<T> {
    let each = files.len() / parallel.total_runs;
    let extra = files.len() % parallel.total_runs;
    let index = parallel.current_index;
    let start = index * each + index.min(extra);
    let take = each + usize::from(index < extra);
    files.into_iter().skip(start).take(take).collect()
}

async fn run_worker(launch: Launch) -> FileResult {
    let started = Instant::now();
    let _ = launch.events.send(RunEvent::StateChange(StateChange::WorkerStarted {
        file: launch.file.clone(),
    }));

    let executed = match launch.timeout {
        Some(limit) => match tokio::time::timeout(limit, execute(&launch)).await {
            Ok(executed) => executed,
            Err(_) => Ok((Outcome::TimedOut(limit), TestCounts::default())),
        },
        None => execute(&launch).await,
    };
    let (outcome, counts) = executed
        .unwrap_or_else(|err| (Outcome::Errored(format!("{:#}", err)), TestCounts::default()));

    let result = FileResult {
        file: launch.file.clone(),
        outcome,
        counts,
        duration: started.elapsed(),
    };
    let _ = launch
        .events
        .send(RunEvent::StateChange(StateChange::WorkerFinished(result.clone())));
    result
}

async fn execute(launch: &Launch) -> Result<(Outcome, TestCounts)> {
    debug!("Launching worker for {}", launch.file.display());

    let mut child = Command::new(&launch.node)
        .args(&launch.node_arguments)
        .arg(launch.project_dir.join(&launch.load_path))
        .args(&launch.worker_argv)
        .envs(&launch.environment_variables)
        .env(WORKER_OPTIONS_ENV, &launch.options)
        .current_dir(&launch.project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to launch worker for {}", launch.file.display()))?;

    let stdout = child.stdout.take().context("Worker stdout is not piped")?;
    let stderr = child.stderr.take().context("Worker stderr is not piped")?;

    let (status, report, _) = tokio::join!(
        child.wait(),
        forward(stdout, OutputStream::Stdout, launch),
        forward(stderr, OutputStream::Stderr, launch),
    );
    let status = status.context("Failed to wait for worker")?;

    let counts = report.unwrap_or_else(|| TestCounts::from_exit(status.success()));
    let outcome = if status.success() && counts.failed == 0 {
        Outcome::Passed
    } else {
        Outcome::Failed {
            exit_code: status.code(),
        }
    };
    Ok((outcome, counts))
}

/// Forward worker output line by line, returning the worker's report if any
async fn forward(
    reader: impl AsyncRead + Unpin,
    stream: OutputStream,
    launch: &Launch,
) -> Option<TestCounts> {
    let mut lines = BufReader::new(reader).lines();
    let mut report = None;

    while let Ok(Some(line)) = lines.next_line().await {
        if stream == OutputStream::Stdout {
            if let Some(parsed) = line
                .strip_prefix(REPORT_PREFIX)
                .and_then(|json| serde_json::from_str(json).ok())
            {
                report = Some(parsed);
                continue;
            }
        }
        let _ = launch.events.send(RunEvent::StateChange(StateChange::WorkerOutput {
            file: launch.file.clone(),
            stream,
            line,
        }));
    }

    report
}
