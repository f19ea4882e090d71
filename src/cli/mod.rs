//! Command-line interface for trial
//!
//! Provides the main CLI structure using clap:
//! - default command: run tests matching the given patterns
//! - `debug`: run a single test file with the inspector attached
//! - `reset-cache`: clear the cache directory

mod debug;
mod reset_cache;
mod schema;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use crate::ci::CiContext;
use crate::config::{CanonicalConfig, ColorMode, Resolution};
use crate::error::Fatal;
use crate::mode::RunMode;
use crate::orchestrator;
use crate::prepare::prepare;
use crate::validate::validate;

pub use debug::DebugCommand;
pub use schema::{Coercion, OptionKind, OptionSpec, RunArgs, OPTION_SCHEMA};

/// Trial - a concurrent test runner for JavaScript projects
#[derive(Parser, Debug)]
#[command(name = "trial")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Test files or glob patterns, optionally with `:line` selectors
    #[arg(value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Arguments passed to worker processes
    #[arg(last = true, value_name = "WORKER_ARGS")]
    pub worker_argv: Vec<String>,

    /// Force color output
    #[arg(long, global = true, overrides_with = "no_color")]
    pub color: bool,

    /// Disable color output
    #[arg(long = "no-color", global = true, overrides_with = "color")]
    pub no_color: bool,

    /// Path to a trial.config.toml file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Debug a single test file
    Debug(DebugCommand),

    /// Delete any temporary files and state kept by trial, then exit
    ResetCache,
}

impl Cli {
    /// Run flags of the invoked command
    fn run_args(&self) -> &RunArgs {
        match &self.command {
            Some(Commands::Debug(cmd)) => &cmd.run,
            _ => &self.run,
        }
    }

    /// Whether `--verbose` was given on the command line
    pub fn verbose(&self) -> bool {
        self.run_args().verbose == Some(true)
    }

    /// Execute the invocation, returning the process exit code
    pub async fn execute(self) -> Result<u8, Fatal> {
        let color = ColorMode::from_flags(self.color, self.no_color);
        color.apply();

        let cwd = std::env::current_dir()
            .map_err(|err| Fatal::Engine(anyhow::Error::new(err).context("Failed to read the working directory")))?;

        let (patterns, worker_argv) = match &self.command {
            Some(Commands::Debug(cmd)) => (cmd.patterns.clone(), cmd.worker_argv.clone()),
            _ => (self.patterns.clone(), self.worker_argv.clone()),
        };

        let resolution = Resolution::resolve(&cwd, self.config.as_deref(), self.run_args().clone());
        let state = resolution.state;
        let mode = RunMode::select(self.command.as_ref(), state.watch_requested());
        debug!("Selected mode {:?}", mode);

        if mode == RunMode::ResetCache {
            return reset_cache::execute(&state.project_dir).await;
        }

        let ci = CiContext::from_env();
        let notices = validate(resolution.load_error, &state, &mode, &ci)?;
        for notice in notices {
            eprintln!("\n  {} {}", "⚠".magenta(), notice);
        }

        let prepared = prepare(&state, &cwd, &patterns, &ci)?;
        let config = CanonicalConfig::build(&state, &prepared, color, worker_argv)?;
        debug!(
            "Resolved configuration: {}",
            serde_json::to_string(&config).unwrap_or_default()
        );

        orchestrator::run(config, prepared, mode, &ci).await
    }
}
