//! Persisted configuration schema

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration as written in `trial.config.toml` or the `"trial"` key of
/// `package.json`.
///
/// Every field is optional: `None` means the key was absent. Options whose
/// type is checked later (concurrency, timeout, match, globs, provider
/// tables) keep the raw value so both formats and the command line share
/// one representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedConfig {
    /// Max number of test files running at the same time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<Value>,

    /// Stop after the first test failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,

    /// Treat tests without assertions as failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_without_assertions: Option<bool>,

    /// Test title patterns, a string or a list of strings
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_patterns: Option<Value>,

    /// Extra arguments for launching worker processes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_arguments: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap: Option<bool>,

    /// Milliseconds or a human-readable duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_snapshots: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<bool>,

    /// Set to `false` to disable the compilation cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,

    /// Directory for snapshot files, relative to the project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,

    /// Variables set in every worker process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,

    /// Glob patterns selecting test files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Value>,

    /// Glob patterns the watcher does not react to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_by_watcher: Option<Value>,

    /// Modules loaded in every worker before the test file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<Value>,

    /// Unsupported, opt-in behavior
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub non_sem_ver_experiments: BTreeMap<String, Value>,

    /// Babel provider options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub babel: Option<Value>,

    /// TypeScript provider options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typescript: Option<Value>,

    // Removed keys. Captured only so they can be rejected with a hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_enhancements: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpers: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Value>,
}
