//! Drives the engine and the reporter to an exit code

use std::sync::Arc;

use tracing::{debug, info};

use crate::ci::CiContext;
use crate::config::CanonicalConfig;
use crate::engine::{self, Engine, EventReceiver, ProcessEngine, RunEvent, RunPlan, RunRequest, RunStatus, StateChange};
use crate::error::Fatal;
use crate::mode::RunMode;
use crate::prepare::Prepared;
use crate::reporter::{self, Reporter, ReporterContext, ReporterOptions};
use crate::watcher::Watcher;

/// How a driven run ended
#[derive(Debug)]
pub enum Drive {
    Completed {
        status: RunStatus,
        plan: Option<RunPlan>,
    },
    Interrupted,
}

/// An engine, its event stream and the reporter rendering it
pub struct Session {
    engine: Box<dyn Engine>,
    events: EventReceiver,
    reporter: Box<dyn Reporter>,
}

impl Session {
    pub fn new(engine: Box<dyn Engine>, events: EventReceiver, reporter: Box<dyn Reporter>) -> Self {
        Self {
            engine,
            events,
            reporter,
        }
    }

    pub fn reporter(&mut self) -> &mut dyn Reporter {
        self.reporter.as_mut()
    }

    /// Run once, forwarding events to the reporter as they arrive
    ///
    /// An interrupt ends the reporter's run and returns at once, dropping the
    /// in-flight run.
    pub async fn drive(&mut self, request: RunRequest) -> Result<Drive, Fatal> {
        let Self {
            engine,
            events,
            reporter,
        } = self;

        let mut plan = None;
        let run = engine.run(request);
        tokio::pin!(run);

        let status = loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => {
                    if dispatch(event, reporter.as_mut(), &mut plan) {
                        return Ok(Drive::Interrupted);
                    }
                }
                result = &mut run => break result.map_err(Fatal::Engine)?,
            }
        };

        while let Ok(event) = events.try_recv() {
            if dispatch(event, reporter.as_mut(), &mut plan) {
                return Ok(Drive::Interrupted);
            }
        }

        reporter.end_run();
        Ok(Drive::Completed { status, plan })
    }
}

/// Hand one event to the reporter; returns whether it was an interrupt
fn dispatch(event: RunEvent, reporter: &mut dyn Reporter, plan: &mut Option<RunPlan>) -> bool {
    match event {
        RunEvent::RunStarted(started) => {
            debug!("Run started with {} files", started.files.len());
            reporter.start_run(&started);
            *plan = Some(started);
            false
        }
        RunEvent::StateChange(StateChange::Interrupt) => {
            reporter.state_change(&StateChange::Interrupt);
            reporter.end_run();
            true
        }
        RunEvent::StateChange(change) => {
            reporter.state_change(&change);
            false
        }
    }
}

/// One-shot run: drive the engine once and derive the exit code
pub async fn run_once(session: &mut Session, matching: bool) -> Result<u8, Fatal> {
    let request = RunRequest {
        first_run: true,
        ..RunRequest::default()
    };

    match session.drive(request).await? {
        Drive::Interrupted => Ok(1),
        Drive::Completed { status, plan } => {
            let debug_without_specific_file = plan
                .as_ref()
                .is_some_and(|plan| plan.debug && plan.files.len() != 1);
            if debug_without_specific_file {
                return Err(Fatal::DebugWithoutSingleFile);
            }
            Ok(status.suggest_exit_code(matching))
        }
    }
}

/// Wire the engine and reporter for the selected mode and run to completion
pub async fn run(
    config: CanonicalConfig,
    prepared: Prepared,
    mode: RunMode,
    ci: &CiContext,
) -> Result<u8, Fatal> {
    let watching = mode.is_watch();
    let context = ReporterContext {
        tap: config.tap,
        verbose: config.verbose,
        watching,
        debugging: mode.debug().is_some(),
        ci: ci.is_ci,
        interactive: console::Term::stdout().is_term(),
    };
    let kind = reporter::select(&context);
    info!("Using {:?} reporter", kind);
    let reporter = reporter::build(
        kind,
        ReporterOptions::standard(config.project_dir.clone(), watching),
    );

    let matching = !config.match_patterns.is_empty();
    let config = Arc::new(config);
    let prepared = Arc::new(prepared);

    let (events_tx, events_rx) = engine::channel();
    let engine = ProcessEngine::new(config.clone(), prepared.clone(), mode.debug().cloned(), events_tx);
    let mut session = Session::new(Box::new(engine), events_rx, reporter);

    if watching {
        let watcher = Watcher::new(
            config.project_dir.clone(),
            prepared.globs.clone(),
            prepared.providers.clone(),
        );
        watcher.run(&mut session).await
    } else {
        run_once(&mut session, matching).await
    }
}
