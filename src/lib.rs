//! Trial library
//!
//! Command-line orchestration for the trial test runner: configuration
//! resolution, validation, mode dispatch, run preparation, reporter
//! selection and the run lifecycle.

pub mod ci;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod mode;
pub mod orchestrator;
pub mod prepare;
pub mod providers;
pub mod reporter;
pub mod utils;
pub mod validate;
pub mod watcher;

pub use cli::Cli;
pub use config::CanonicalConfig;
pub use error::Fatal;
