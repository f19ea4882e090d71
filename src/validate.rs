//! Invocation validation
//!
//! Runs after configuration resolution and mode selection, before any
//! side effect. The first violated rule becomes a [`Fatal`]; non-fatal
//! observations are returned as [`Notice`]s for the caller to print.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::ci::CiContext;
use crate::config::MergedState;
use crate::error::{ConfigError, Fatal};
use crate::mode::RunMode;

pub const CONCURRENCY_MESSAGE: &str =
    "The --concurrency or -c flag must be provided with a nonnegative integer.";

/// Removed configuration keys and how to migrate away from each
const LEGACY_KEYS: &[(&str, &str)] = &[
    (
        "compileEnhancements",
        "Enhancement compilation must be configured in the babel provider options.",
    ),
    (
        "helpers",
        "Helpers are no longer compiled. Add exclusion patterns to the 'files' configuration and specify 'compileAsTests' in the babel provider options instead.",
    ),
    (
        "sources",
        "'sources' has been removed. Use 'ignoredByWatcher' to provide glob patterns of files that the watcher should ignore.",
    ),
];

/// Non-fatal observation about the invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    TimeoutDisabled,
    ExperimentsEnabled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::TimeoutDisabled => {
                f.write_str("The timeout option has been disabled to help with debugging.")
            }
            Notice::ExperimentsEnabled => f.write_str(
                "Experiments are enabled. These are unsupported and may change or be removed at any time.",
            ),
        }
    }
}

/// Interpret a concurrency value; `None` unless it is a nonnegative integer
pub fn parse_concurrency(value: &Value) -> Option<usize> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(n) = number.as_u64() {
        return usize::try_from(n).ok();
    }
    let f = number.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64).then_some(f as usize)
}

fn fail<T>(message: &str) -> Result<T, Fatal> {
    Err(Fatal::Validation(message.to_string()))
}

/// Check the resolved invocation
///
/// `load_error` is the configuration error deferred by the resolver; it is
/// reported before anything else.
pub fn validate(
    load_error: Option<ConfigError>,
    state: &MergedState,
    mode: &RunMode,
    ci: &CiContext,
) -> Result<Vec<Notice>, Fatal> {
    if let Some(err) = load_error {
        return Err(err.into());
    }

    let mut notices = Vec::new();
    let debugging = mode.debug().is_some();

    if state.watch_requested() {
        if state.tap_requested_ad_hoc() {
            return fail("The TAP reporter is not available when using watch mode.");
        }
        if ci.is_ci {
            return fail("Watch mode is not available in CI, as it prevents trial from terminating.");
        }
        if debugging {
            return fail("Watch mode is not available when debugging.");
        }
    }

    if debugging {
        if state.tap_requested_ad_hoc() {
            return fail("The TAP reporter is not available when debugging.");
        }
        if ci.is_ci {
            return fail("Debugging is not available in CI.");
        }
        if state.merged.timeout.is_some() {
            notices.push(Notice::TimeoutDisabled);
        }
    }

    if let Some(concurrency) = &state.merged.concurrency {
        if parse_concurrency(concurrency).is_none() {
            return fail(CONCURRENCY_MESSAGE);
        }
    }

    let persisted = &state.persisted;
    let present = [
        persisted.compile_enhancements.is_some(),
        persisted.helpers.is_some(),
        persisted.sources.is_some(),
    ];
    for ((key, message), present) in LEGACY_KEYS.iter().zip(present) {
        if present {
            debug!("Rejecting removed configuration key {}", key);
            return fail(message);
        }
    }

    if !state.tap_requested() && !state.merged.non_sem_ver_experiments.is_empty() {
        notices.push(Notice::ExperimentsEnabled);
    }

    Ok(notices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunArgs;
    use crate::config::{merge, PersistedConfig};
    use crate::mode::DebugOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;

    fn state(persisted: PersistedConfig, flags: RunArgs) -> MergedState {
        let merged = merge(&persisted, &flags);
        MergedState {
            project_dir: PathBuf::from("/project"),
            persisted,
            flags,
            merged,
        }
    }

    fn debug_mode() -> RunMode {
        RunMode::Debug(DebugOptions {
            break_before_load: false,
            host: "127.0.0.1".into(),
            port: 9229,
            files: vec!["test.js".into()],
        })
    }

    fn not_ci() -> CiContext {
        CiContext::detect(|_| None)
    }

    fn ci() -> CiContext {
        CiContext::detect(|key| (key == "CI").then(|| "true".to_string()))
    }

    fn message(result: Result<Vec<Notice>, Fatal>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_clean_invocation_passes() {
        let state = state(PersistedConfig::default(), RunArgs::default());
        assert_eq!(validate(None, &state, &RunMode::Run, &not_ci()).unwrap(), vec![]);
    }

    #[test]
    fn test_deferred_config_error_comes_first() {
        let flags = RunArgs {
            concurrency: Some(json!(-1)),
            ..RunArgs::default()
        };
        let state = state(PersistedConfig::default(), flags);
        let err = ConfigError::new("Error parsing trial.config.toml");

        assert_eq!(
            message(validate(Some(err), &state, &RunMode::Run, &not_ci())),
            "Error parsing trial.config.toml"
        );
    }

    #[test]
    fn test_concurrency_must_be_nonnegative_integer() {
        for bad in [json!(-1), json!(1.5), json!("many"), json!(true)] {
            let flags = RunArgs {
                concurrency: Some(bad),
                ..RunArgs::default()
            };
            let state = state(PersistedConfig::default(), flags);
            let msg = message(validate(None, &state, &RunMode::Run, &not_ci()));
            assert!(msg.contains("nonnegative integer"));
        }

        for good in [json!(0), json!(1), json!(16), json!(4.0)] {
            let flags = RunArgs {
                concurrency: Some(good),
                ..RunArgs::default()
            };
            let state = state(PersistedConfig::default(), flags);
            assert!(validate(None, &state, &RunMode::Run, &not_ci()).is_ok());
        }
    }

    #[test]
    fn test_watch_with_ad_hoc_tap() {
        let flags = RunArgs {
            watch: Some(true),
            tap: Some(true),
            ..RunArgs::default()
        };
        let state = state(PersistedConfig::default(), flags);
        assert_eq!(
            message(validate(None, &state, &RunMode::Watch, &not_ci())),
            "The TAP reporter is not available when using watch mode."
        );
    }

    #[test]
    fn test_watch_with_persisted_tap_is_allowed() {
        let persisted = PersistedConfig {
            tap: Some(true),
            ..PersistedConfig::default()
        };
        let flags = RunArgs {
            watch: Some(true),
            tap: Some(true),
            ..RunArgs::default()
        };
        let state = state(persisted, flags);
        assert!(validate(None, &state, &RunMode::Watch, &not_ci()).is_ok());
    }

    #[test]
    fn test_watch_in_ci() {
        let flags = RunArgs {
            watch: Some(true),
            ..RunArgs::default()
        };
        let state = state(PersistedConfig::default(), flags);
        assert_eq!(
            message(validate(None, &state, &RunMode::Watch, &ci())),
            "Watch mode is not available in CI, as it prevents trial from terminating."
        );
    }

    #[test]
    fn test_watch_and_debug_are_exclusive() {
        let flags = RunArgs {
            watch: Some(true),
            ..RunArgs::default()
        };
        let state = state(PersistedConfig::default(), flags);
        assert_eq!(
            message(validate(None, &state, &debug_mode(), &not_ci())),
            "Watch mode is not available when debugging."
        );
    }

    #[test]
    fn test_debug_restrictions() {
        let tap = state(
            PersistedConfig::default(),
            RunArgs {
                tap: Some(true),
                ..RunArgs::default()
            },
        );
        assert_eq!(
            message(validate(None, &tap, &debug_mode(), &not_ci())),
            "The TAP reporter is not available when debugging."
        );

        let plain = state(PersistedConfig::default(), RunArgs::default());
        assert_eq!(
            message(validate(None, &plain, &debug_mode(), &ci())),
            "Debugging is not available in CI."
        );
    }

    #[test]
    fn test_debug_with_timeout_is_a_notice() {
        let persisted = PersistedConfig {
            timeout: Some(json!("1m")),
            ..PersistedConfig::default()
        };
        let state = state(persisted, RunArgs::default());
        assert_eq!(
            validate(None, &state, &debug_mode(), &not_ci()).unwrap(),
            vec![Notice::TimeoutDisabled]
        );
    }

    #[test]
    fn test_legacy_keys_each_have_a_message() {
        let configs = [
            PersistedConfig {
                compile_enhancements: Some(json!(false)),
                ..PersistedConfig::default()
            },
            PersistedConfig {
                helpers: Some(json!(["helpers/**"])),
                ..PersistedConfig::default()
            },
            PersistedConfig {
                sources: Some(json!(["src/**"])),
                ..PersistedConfig::default()
            },
        ];

        let messages: Vec<String> = configs
            .into_iter()
            .map(|persisted| {
                let flags = RunArgs {
                    verbose: Some(true),
                    ..RunArgs::default()
                };
                message(validate(None, &state(persisted, flags), &RunMode::Run, &not_ci()))
            })
            .collect();

        assert!(messages[0].contains("Enhancement compilation"));
        assert!(messages[1].contains("compileAsTests"));
        assert!(messages[2].contains("ignoredByWatcher"));
    }

    #[test]
    fn test_experiments_warning_unless_tap() {
        let mut persisted = PersistedConfig::default();
        persisted
            .non_sem_ver_experiments
            .insert("nextGenConfig".into(), json!(true));

        let state_plain = state(persisted.clone(), RunArgs::default());
        assert_eq!(
            validate(None, &state_plain, &RunMode::Run, &not_ci()).unwrap(),
            vec![Notice::ExperimentsEnabled]
        );

        let state_tap = state(
            persisted,
            RunArgs {
                tap: Some(true),
                ..RunArgs::default()
            },
        );
        assert_eq!(validate(None, &state_tap, &RunMode::Run, &not_ci()).unwrap(), vec![]);
    }
}
