//! Command-line flags over persisted configuration

use serde_json::Value;
use tracing::debug;

use super::PersistedConfig;
use crate::cli::RunArgs;

/// Apply command-line flags over the persisted configuration
///
/// A flag present on the command line replaces the persisted value; absent
/// flags leave it untouched. `--node-arguments` is not merged here: it is
/// combined with the persisted list during preparation.
pub fn merge(persisted: &PersistedConfig, flags: &RunArgs) -> PersistedConfig {
    let mut merged = persisted.clone();

    overlay(&mut merged.concurrency, &flags.concurrency, "concurrency");
    overlay(&mut merged.fail_fast, &flags.fail_fast, "failFast");
    overlay(&mut merged.serial, &flags.serial, "serial");
    overlay(&mut merged.tap, &flags.tap, "tap");
    overlay(&mut merged.timeout, &flags.timeout, "timeout");
    overlay(&mut merged.update_snapshots, &flags.update_snapshots, "updateSnapshots");
    overlay(&mut merged.verbose, &flags.verbose, "verbose");
    overlay(&mut merged.watch, &flags.watch, "watch");

    if let Some(patterns) = &flags.match_patterns {
        debug!("--match overrides persisted match");
        merged.match_patterns = Some(Value::Array(
            patterns.iter().cloned().map(Value::String).collect(),
        ));
    }

    merged
}

fn overlay<T: Clone>(slot: &mut Option<T>, flag: &Option<T>, key: &str) {
    if let Some(value) = flag {
        if slot.is_some() {
            debug!("Command-line flag overrides persisted {}", key);
        }
        *slot = Some(value.clone());
    }
}

/// Normalize the merged `match` value into a list of title patterns
///
/// Nested lists are flattened. Empty strings and non-string entries are
/// dropped, so `--match ""` clears the patterns.
pub fn match_patterns(value: Option<&Value>) -> Vec<String> {
    let mut patterns = Vec::new();
    if let Some(value) = value {
        flatten(value, &mut patterns);
    }
    patterns.retain(|pattern| !pattern.is_empty());
    patterns
}

fn flatten(value: &Value, into: &mut Vec<String>) {
    match value {
        Value::String(s) => into.push(s.clone()),
        Value::Number(n) => into.push(n.to_string()),
        Value::Array(items) => {
            for item in items {
                flatten(item, into);
            }
        }
        _ => {}
    }
}
