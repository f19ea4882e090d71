//! `debug` command

use clap::Args;

use super::RunArgs;
use crate::mode::DebugOptions;

/// Debug a single test file with the Node.js inspector
#[derive(Args, Debug, Clone)]
pub struct DebugCommand {
    #[command(flatten)]
    pub run: RunArgs,

    /// Break before the test file is loaded
    #[arg(long = "break")]
    pub break_before_load: bool,

    /// Address or hostname through which you can connect to the inspector
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port on which you can connect to the inspector
    #[arg(long, default_value_t = 9229)]
    pub port: u16,

    /// Test file to debug
    #[arg(value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Arguments passed to the worker process
    #[arg(last = true, value_name = "WORKER_ARGS")]
    pub worker_argv: Vec<String>,
}

impl DebugCommand {
    pub fn options(&self) -> DebugOptions {
        DebugOptions {
            break_before_load: self.break_before_load,
            host: self.host.clone(),
            port: self.port,
            files: self.patterns.clone(),
        }
    }
}
