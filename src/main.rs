//! Trial - a concurrent test runner for JavaScript projects
//!
//! Resolves configuration from `trial.config.toml` or `package.json`,
//! merges command-line flags over it and runs each test file in its own
//! Node.js worker process.
//!
//! # Modes
//! - run: execute the matching test files once
//! - watch: re-run affected files when the project changes
//! - debug: run a single file with the inspector attached
//! - reset-cache: clear cached compilation state

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trial_lib::Cli;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trial=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trial=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose());

    match cli.execute().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("\n  {} {}\n", "✘".red(), err.render());
            ExitCode::FAILURE
        }
    }
}
