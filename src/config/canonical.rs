//! The validated, merged run configuration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::{match_patterns, MergedState};
use crate::error::Fatal;
use crate::prepare::Prepared;
use crate::utils::parse_duration;
use crate::validate::{parse_concurrency, CONCURRENCY_MESSAGE};

/// Timeout used when none is configured
pub const DEFAULT_TIMEOUT: &str = "10s";

/// Color output preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Always,
    Never,
    #[default]
    Auto,
}

impl ColorMode {
    /// Derive the mode from `--color` / `--no-color`
    pub fn from_flags(color: bool, no_color: bool) -> Self {
        match (color, no_color) {
            (true, _) => ColorMode::Always,
            (false, true) => ColorMode::Never,
            (false, false) => ColorMode::Auto,
        }
    }

    /// Configure terminal styling for this process
    pub fn apply(self) {
        match self {
            ColorMode::Always => colored::control::set_override(true),
            ColorMode::Never => colored::control::set_override(false),
            ColorMode::Auto => {}
        }
    }

    /// Whether styled output is produced
    pub fn enabled(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => colored::control::SHOULD_COLORIZE.should_colorize(),
        }
    }
}

/// A parsed timeout, keeping the configured spelling for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeout {
    pub label: String,
    #[serde(skip)]
    pub duration: Duration,
}

impl Timeout {
    /// Parse a configured timeout: milliseconds or a duration string
    ///
    /// Absent, zero and empty values fall back to [`DEFAULT_TIMEOUT`].
    pub fn parse(value: Option<&Value>) -> Result<Self, String> {
        let invalid = |shown: &dyn std::fmt::Display| {
            format!(
                "The 'timeout' option must be a number of milliseconds or a duration such as 10s or 2m, got '{}'.",
                shown
            )
        };

        let millis = |ms: f64, shown: &dyn std::fmt::Display| Self {
            label: format!("{}ms", shown),
            duration: Duration::from_secs_f64(ms / 1_000.0),
        };

        match value {
            None | Some(Value::Null) => Self::default_timeout(),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(ms) if ms == 0.0 => Self::default_timeout(),
                Some(ms) if ms > 0.0 && ms.is_finite() => Ok(millis(ms, n)),
                _ => Err(invalid(n)),
            },
            Some(Value::String(s)) if s.trim().is_empty() => Self::default_timeout(),
            Some(Value::String(s)) => {
                let s = s.trim();
                match s.parse::<f64>() {
                    Ok(ms) if ms == 0.0 => Self::default_timeout(),
                    Ok(ms) if ms > 0.0 && ms.is_finite() => Ok(millis(ms, &s)),
                    Ok(_) => Err(invalid(&s)),
                    Err(_) => {
                        let duration = parse_duration(s).ok_or_else(|| invalid(&s))?;
                        Ok(Self {
                            label: s.to_string(),
                            duration,
                        })
                    }
                }
            }
            Some(other) => Err(invalid(other)),
        }
    }

    fn default_timeout() -> Result<Self, String> {
        Ok(Self {
            label: DEFAULT_TIMEOUT.to_string(),
            duration: Duration::from_secs(10),
        })
    }
}

/// The single validated configuration for one invocation
///
/// Built once, after validation and preparation succeed, and read-only
/// afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalConfig {
    /// Max concurrent test files, `0` meaning one per CPU
    pub concurrency: usize,
    pub fail_fast: bool,
    pub fail_without_assertions: bool,
    /// Title patterns; empty means every test
    #[serde(rename = "match")]
    pub match_patterns: Vec<String>,
    pub timeout: Timeout,
    pub serial: bool,
    pub tap: bool,
    pub verbose: bool,
    pub watch: bool,
    pub update_snapshots: bool,
    pub color: ColorMode,
    pub node_arguments: Vec<String>,
    pub environment_variables: BTreeMap<String, String>,
    pub snapshot_dir: Option<PathBuf>,
    pub cache_enabled: bool,
    pub project_dir: PathBuf,
    pub experiments: BTreeMap<String, Value>,
    /// Modules loaded before each test file
    pub require: Vec<String>,
    /// Arguments given after `--`, passed to every worker
    pub worker_argv: Vec<String>,
}

impl CanonicalConfig {
    pub fn build(
        state: &MergedState,
        prepared: &Prepared,
        color: ColorMode,
        worker_argv: Vec<String>,
    ) -> Result<Self, Fatal> {
        let merged = &state.merged;

        let concurrency = match &merged.concurrency {
            None => 0,
            Some(value) => parse_concurrency(value)
                .ok_or_else(|| Fatal::Validation(CONCURRENCY_MESSAGE.to_string()))?,
        };

        let timeout = Timeout::parse(merged.timeout.as_ref()).map_err(Fatal::Preparation)?;
        let require = string_list(merged.require.as_ref()).ok_or_else(|| {
            Fatal::Preparation(
                "The 'require' configuration must be a string or an array of module names."
                    .to_string(),
            )
        })?;

        Ok(Self {
            concurrency,
            fail_fast: merged.fail_fast == Some(true),
            fail_without_assertions: merged.fail_without_assertions != Some(false),
            match_patterns: match_patterns(merged.match_patterns.as_ref()),
            timeout,
            serial: merged.serial == Some(true),
            tap: merged.tap == Some(true),
            verbose: merged.verbose == Some(true),
            watch: merged.watch == Some(true),
            update_snapshots: merged.update_snapshots == Some(true),
            color,
            node_arguments: prepared.node_arguments.clone(),
            environment_variables: prepared.environment_variables.clone(),
            snapshot_dir: merged
                .snapshot_dir
                .as_ref()
                .map(|dir| state.project_dir.join(dir)),
            cache_enabled: merged.cache != Some(false),
            project_dir: state.project_dir.clone(),
            experiments: merged.non_sem_ver_experiments.clone(),
            require,
            worker_argv,
        })
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::String(s)) => Some(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunArgs;
    use crate::config::{merge, PersistedConfig};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state(persisted: PersistedConfig, flags: RunArgs) -> MergedState {
        let merged = merge(&persisted, &flags);
        MergedState {
            project_dir: PathBuf::from("/project"),
            persisted,
            flags,
            merged,
        }
    }

    #[test]
    fn test_clean_project_defaults() {
        let state = state(PersistedConfig::default(), RunArgs::default());
        let config =
            CanonicalConfig::build(&state, &Prepared::default(), ColorMode::Auto, Vec::new())
                .unwrap();

        assert_eq!(config.concurrency, 0);
        assert_eq!(config.timeout.label, "10s");
        assert_eq!(config.timeout.duration, Duration::from_secs(10));
        assert!(config.fail_without_assertions);
        assert!(config.cache_enabled);
        assert!(config.match_patterns.is_empty());
        assert_eq!(config.snapshot_dir, None);
        assert_eq!(config.project_dir, PathBuf::from("/project"));
    }

    #[test]
    fn test_command_line_wins_in_canonical_record() {
        let persisted = PersistedConfig {
            concurrency: Some(json!(2)),
            verbose: Some(false),
            snapshot_dir: Some(PathBuf::from("snapshots")),
            ..PersistedConfig::default()
        };
        let flags = RunArgs {
            concurrency: Some(json!(6)),
            verbose: Some(true),
            ..RunArgs::default()
        };

        let config = CanonicalConfig::build(
            &state(persisted, flags),
            &Prepared::default(),
            ColorMode::Never,
            vec!["--foo".into()],
        )
        .unwrap();

        assert_eq!(config.concurrency, 6);
        assert!(config.verbose);
        assert_eq!(config.snapshot_dir, Some(PathBuf::from("/project/snapshots")));
        assert_eq!(config.worker_argv, vec!["--foo"]);
    }

    #[test]
    fn test_timeout_parsing() {
        assert_eq!(
            Timeout::parse(Some(&json!(2500))).unwrap().duration,
            Duration::from_millis(2500)
        );
        assert_eq!(
            Timeout::parse(Some(&json!("2m"))).unwrap().duration,
            Duration::from_secs(120)
        );
        assert_eq!(Timeout::parse(Some(&json!("1500"))).unwrap().label, "1500ms");
        assert_eq!(
            Timeout::parse(Some(&json!("1h 30m"))).unwrap().duration,
            Duration::from_secs(5400)
        );
        assert_eq!(
            Timeout::parse(Some(&json!("750"))).unwrap().duration,
            Duration::from_millis(750)
        );
        assert!(Timeout::parse(Some(&json!("-5"))).is_err());
        assert_eq!(Timeout::parse(Some(&json!(0))).unwrap().label, "10s");
        assert!(Timeout::parse(Some(&json!("soon"))).is_err());
        assert!(Timeout::parse(Some(&json!(true))).is_err());
    }

    #[test]
    fn test_require_must_be_strings() {
        let persisted = PersistedConfig {
            require: Some(json!([1, 2])),
            ..PersistedConfig::default()
        };
        let result = CanonicalConfig::build(
            &state(persisted, RunArgs::default()),
            &Prepared::default(),
            ColorMode::Auto,
            Vec::new(),
        );
        assert!(matches!(result, Err(Fatal::Preparation(_))));
    }

    #[test]
    fn test_color_mode_from_flags() {
        assert_eq!(ColorMode::from_flags(true, false), ColorMode::Always);
        assert_eq!(ColorMode::from_flags(false, true), ColorMode::Never);
        assert_eq!(ColorMode::from_flags(false, false), ColorMode::Auto);
    }
}
