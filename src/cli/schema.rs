//! Run flags shared by the default and `debug` commands
//!
//! The flags are declared once in [`OPTION_SCHEMA`] and registered with clap
//! from that table, so parsing rules (negation, aliases, last-value-wins,
//! numeric coercion) are uniform across every flag.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Args, Command, FromArgMatches};
use serde_json::{Number, Value};

/// Value type of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Boolean,
    Number,
    String,
}

/// How repeated occurrences of a flag are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Later occurrences replace earlier ones
    LastValue,
    /// Every occurrence is kept, in order
    Collect,
}

/// Declaration of one command-line flag
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub name: &'static str,
    pub alias: Option<char>,
    pub kind: OptionKind,
    pub coercion: Coercion,
    pub description: &'static str,
}

/// Flags accepted by the default and `debug` commands
pub const OPTION_SCHEMA: &[OptionSpec] = &[
    OptionSpec {
        name: "concurrency",
        alias: Some('c'),
        kind: OptionKind::Number,
        coercion: Coercion::LastValue,
        description: "Max number of test files running at the same time (default: CPU cores)",
    },
    OptionSpec {
        name: "fail-fast",
        alias: None,
        kind: OptionKind::Boolean,
        coercion: Coercion::LastValue,
        description: "Stop after first test failure",
    },
    OptionSpec {
        name: "match",
        alias: Some('m'),
        kind: OptionKind::String,
        coercion: Coercion::Collect,
        description: "Only run tests with matching title (can be repeated)",
    },
    OptionSpec {
        name: "node-arguments",
        alias: None,
        kind: OptionKind::String,
        coercion: Coercion::LastValue,
        description: "Additional Node.js arguments for launching worker processes (specify as a single string)",
    },
    OptionSpec {
        name: "serial",
        alias: Some('s'),
        kind: OptionKind::Boolean,
        coercion: Coercion::LastValue,
        description: "Run tests serially",
    },
    OptionSpec {
        name: "tap",
        alias: Some('t'),
        kind: OptionKind::Boolean,
        coercion: Coercion::LastValue,
        description: "Generate TAP output",
    },
    OptionSpec {
        name: "timeout",
        alias: Some('T'),
        kind: OptionKind::String,
        coercion: Coercion::LastValue,
        description: "Set global timeout (milliseconds or human-readable, e.g. 10s, 2m)",
    },
    OptionSpec {
        name: "update-snapshots",
        alias: Some('u'),
        kind: OptionKind::Boolean,
        coercion: Coercion::LastValue,
        description: "Update snapshots",
    },
    OptionSpec {
        name: "verbose",
        alias: Some('v'),
        kind: OptionKind::Boolean,
        coercion: Coercion::LastValue,
        description: "Enable verbose output",
    },
    OptionSpec {
        name: "watch",
        alias: Some('w'),
        kind: OptionKind::Boolean,
        coercion: Coercion::LastValue,
        description: "Re-run tests when files change",
    },
];

impl OptionSpec {
    /// Look up a flag by name
    pub fn find(name: &str) -> Option<&'static OptionSpec> {
        OPTION_SCHEMA.iter().find(|spec| spec.name == name)
    }

    /// Id of the hidden `--no-<name>` counterpart of a boolean flag
    pub fn negation(&self) -> String {
        format!("no-{}", self.name)
    }

    /// Add this flag (and its negation, for booleans) to a command
    pub fn register(&self, cmd: Command) -> Command {
        let mut arg = Arg::new(self.name).long(self.name).help(self.description);
        if let Some(alias) = self.alias {
            arg = arg.short(alias);
        }

        match (self.kind, self.coercion) {
            (OptionKind::Boolean, _) => {
                let negation = self.negation();
                cmd.arg(
                    arg.action(ArgAction::SetTrue)
                        .overrides_with(negation.clone()),
                )
                .arg(
                    Arg::new(negation.clone())
                        .long(negation)
                        .action(ArgAction::SetTrue)
                        .overrides_with(self.name)
                        .hide(true),
                )
            }
            (_, Coercion::Collect) => cmd.arg(
                arg.action(ArgAction::Append)
                    .value_name("PATTERN")
                    .allow_hyphen_values(true),
            ),
            (OptionKind::Number, Coercion::LastValue) => cmd.arg(
                arg.action(ArgAction::Set)
                    .value_name("NUMBER")
                    .allow_negative_numbers(true),
            ),
            (OptionKind::String, Coercion::LastValue) => cmd.arg(
                arg.action(ArgAction::Set)
                    .value_name("VALUE")
                    .allow_hyphen_values(true),
            ),
        }
    }

    /// Coerce a raw command-line value according to the flag's type
    ///
    /// Numeric flags turn numeric-looking input into numbers and keep
    /// anything else as a string so validation can report it.
    pub fn coerce(&self, raw: &str) -> Value {
        match self.kind {
            OptionKind::Number => parse_number(raw)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            OptionKind::Boolean | OptionKind::String => Value::String(raw.to_string()),
        }
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    let raw = raw.trim();
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

/// Values of the run flags; `None` means the flag was not given
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    pub concurrency: Option<Value>,
    pub fail_fast: Option<bool>,
    pub match_patterns: Option<Vec<String>>,
    pub node_arguments: Option<String>,
    pub serial: Option<bool>,
    pub tap: Option<bool>,
    pub timeout: Option<Value>,
    pub update_snapshots: Option<bool>,
    pub verbose: Option<bool>,
    pub watch: Option<bool>,
}

fn given(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

fn flag(matches: &ArgMatches, name: &'static str) -> Option<bool> {
    let spec = OptionSpec::find(name)?;
    if given(matches, spec.name) {
        Some(true)
    } else if given(matches, &spec.negation()) {
        Some(false)
    } else {
        None
    }
}

fn scalar(matches: &ArgMatches, name: &'static str) -> Option<Value> {
    let spec = OptionSpec::find(name)?;
    if !given(matches, spec.name) {
        return None;
    }
    matches
        .get_one::<String>(spec.name)
        .map(|raw| spec.coerce(raw))
}

fn list(matches: &ArgMatches, name: &'static str) -> Option<Vec<String>> {
    if !given(matches, name) {
        return None;
    }
    matches
        .get_many::<String>(name)
        .map(|values| values.cloned().collect())
}

impl FromArgMatches for RunArgs {
    fn from_arg_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        Ok(Self {
            concurrency: scalar(matches, "concurrency"),
            fail_fast: flag(matches, "fail-fast"),
            match_patterns: list(matches, "match"),
            node_arguments: scalar(matches, "node-arguments").and_then(|value| match value {
                Value::String(s) => Some(s),
                _ => None,
            }),
            serial: flag(matches, "serial"),
            tap: flag(matches, "tap"),
            timeout: scalar(matches, "timeout"),
            update_snapshots: flag(matches, "update-snapshots"),
            verbose: flag(matches, "verbose"),
            watch: flag(matches, "watch"),
        })
    }

    fn update_from_arg_matches(&mut self, matches: &ArgMatches) -> Result<(), clap::Error> {
        *self = Self::from_arg_matches(matches)?;
        Ok(())
    }
}

impl Args for RunArgs {
    fn augment_args(cmd: Command) -> Command {
        OPTION_SCHEMA
            .iter()
            .fold(cmd.args_override_self(true), |cmd, spec| spec.register(cmd))
    }

    fn augment_args_for_update(cmd: Command) -> Command {
        Self::augment_args(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(args: &[&str]) -> RunArgs {
        let cmd = RunArgs::augment_args(Command::new("trial"));
        let matches = cmd.try_get_matches_from(args).unwrap();
        RunArgs::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn test_absent_flags_are_none() {
        assert_eq!(parse(&["trial"]), RunArgs::default());
    }

    #[test]
    fn test_aliases_and_numbers() {
        let args = parse(&["trial", "-c", "4", "-v", "-T", "2m"]);
        assert_eq!(args.concurrency, Some(json!(4)));
        assert_eq!(args.verbose, Some(true));
        assert_eq!(args.timeout, Some(json!("2m")));
    }

    #[test]
    fn test_negative_and_non_numeric_concurrency() {
        assert_eq!(parse(&["trial", "--concurrency", "-1"]).concurrency, Some(json!(-1)));
        assert_eq!(parse(&["trial", "--concurrency", "1.5"]).concurrency, Some(json!(1.5)));
        assert_eq!(
            parse(&["trial", "--concurrency", "many"]).concurrency,
            Some(json!("many"))
        );
    }

    #[test]
    fn test_negation_prefix() {
        assert_eq!(parse(&["trial", "--no-fail-fast"]).fail_fast, Some(false));
        assert_eq!(parse(&["trial", "--tap", "--no-tap"]).tap, Some(false));
        assert_eq!(parse(&["trial", "--no-tap", "--tap"]).tap, Some(true));
    }

    #[test]
    fn test_repeated_scalar_keeps_last_value() {
        let args = parse(&["trial", "-c", "2", "-c", "3", "--serial", "--serial"]);
        assert_eq!(args.concurrency, Some(json!(3)));
        assert_eq!(args.serial, Some(true));
    }

    #[test]
    fn test_match_collects() {
        let args = parse(&["trial", "-m", "foo*", "--match", "*bar"]);
        assert_eq!(
            args.match_patterns,
            Some(vec!["foo*".to_string(), "*bar".to_string()])
        );
        assert_eq!(parse(&["trial", "--match", ""]).match_patterns, Some(vec![String::new()]));
    }

    #[test]
    fn test_node_arguments_stay_a_string() {
        let args = parse(&["trial", "--node-arguments", "--max-old-space-size=4096 --trace-deprecation"]);
        assert_eq!(
            args.node_arguments.as_deref(),
            Some("--max-old-space-size=4096 --trace-deprecation")
        );
    }

    #[test]
    fn test_schema_names_are_unique() {
        for (i, spec) in OPTION_SCHEMA.iter().enumerate() {
            assert!(OPTION_SCHEMA[i + 1..].iter().all(|other| other.name != spec.name));
        }
    }
}
