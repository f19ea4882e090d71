//! Run mode selection
//!
//! Exactly one mode is active per invocation. Reset-cache short-circuits
//! everything else; debug takes precedence over watch so that the validator
//! can reject the combination.

use serde::Serialize;

use crate::cli::Commands;

/// Inspector settings for a debug run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugOptions {
    /// Pause before the test file is loaded
    #[serde(rename = "break")]
    pub break_before_load: bool,
    pub host: String,
    pub port: u16,
    /// Requested file patterns
    pub files: Vec<String>,
}

impl DebugOptions {
    /// The `--inspect` flag handed to the worker process
    pub fn inspect_flag(&self) -> String {
        let flag = if self.break_before_load {
            "--inspect-brk"
        } else {
            "--inspect"
        };
        format!("{}={}:{}", flag, self.host, self.port)
    }
}

/// The operating mode of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    ResetCache,
    Debug(DebugOptions),
    Watch,
    Run,
}

impl RunMode {
    pub fn select(command: Option<&Commands>, watch: bool) -> Self {
        match command {
            Some(Commands::ResetCache) => RunMode::ResetCache,
            Some(Commands::Debug(cmd)) => RunMode::Debug(cmd.options()),
            None if watch => RunMode::Watch,
            None => RunMode::Run,
        }
    }

    pub fn debug(&self) -> Option<&DebugOptions> {
        match self {
            RunMode::Debug(options) => Some(options),
            _ => None,
        }
    }

    pub fn is_watch(&self) -> bool {
        matches!(self, RunMode::Watch)
    }
}
