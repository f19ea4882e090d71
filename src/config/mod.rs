//! Configuration handling for trial
//!
//! Loads the persisted configuration (`trial.config.toml` or the `"trial"`
//! key in `package.json`), merges command-line flags over it and, once the
//! invocation has been validated, produces the [`CanonicalConfig`] consumed
//! by every downstream component.

mod canonical;
mod merge;
mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cli::RunArgs;
use crate::error::ConfigError;

pub use canonical::{CanonicalConfig, ColorMode, Timeout, DEFAULT_TIMEOUT};
pub use merge::{match_patterns, merge};
pub use schema::PersistedConfig;

/// Name of the configuration file looked up in the project directory
pub const CONFIG_FILE: &str = "trial.config.toml";

/// Key holding the configuration inside `package.json`
pub const PACKAGE_KEY: &str = "trial";

/// The compilation and test cache of a project
pub fn cache_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("node_modules").join(".cache").join(PACKAGE_KEY)
}

/// Locate the project directory: the nearest ancestor of `cwd` containing a
/// `package.json`, or `cwd` itself.
pub fn find_project_dir(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|dir| dir.join("package.json").is_file())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.to_path_buf())
}

/// Load the persisted configuration for a project
///
/// `explicit` is the `--config` value, resolved against `cwd`.
pub fn load(
    project_dir: &Path,
    cwd: &Path,
    explicit: Option<&Path>,
) -> Result<PersistedConfig, ConfigError> {
    let from_package = read_package_config(project_dir)?;

    let file = match explicit {
        Some(path) => {
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                cwd.join(path)
            };
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                return Err(ConfigError::new(format!(
                    "Config files must have a .toml extension: {}",
                    path.display()
                )));
            }
            Some(path)
        }
        None => {
            let path = project_dir.join(CONFIG_FILE);
            path.is_file().then_some(path)
        }
    };

    match (file, from_package) {
        (Some(file), Some(_)) => Err(ConfigError::new(format!(
            "Conflicting configuration in {} and package.json",
            file_label(&file)
        ))),
        (Some(file), None) => read_config_file(&file),
        (None, Some(config)) => Ok(config),
        (None, None) => Ok(PersistedConfig::default()),
    }
}

fn read_config_file(path: &Path) -> Result<PersistedConfig, ConfigError> {
    debug!("Loading configuration from {}", path.display());

    let content = fs::read_to_string(path).map_err(|err| {
        ConfigError::with_parent(format!("Error loading {}", path.display()), err)
    })?;

    toml::from_str(&content).map_err(|err| {
        ConfigError::with_parent(format!("Error parsing {}", file_label(path)), err)
    })
}

fn read_package_config(project_dir: &Path) -> Result<Option<PersistedConfig>, ConfigError> {
    let path = project_dir.join("package.json");
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .map_err(|err| ConfigError::with_parent("Error loading package.json", err))?;
    let mut manifest: serde_json::Value = serde_json::from_str(&content)
        .map_err(|err| ConfigError::with_parent("Error parsing package.json", err))?;

    match manifest.get_mut(PACKAGE_KEY).map(serde_json::Value::take) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some).map_err(|err| {
            ConfigError::with_parent(
                format!("Invalid \"{}\" configuration in package.json", PACKAGE_KEY),
                err,
            )
        }),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Working state after merging flags over the persisted configuration
#[derive(Debug, Clone)]
pub struct MergedState {
    /// Absolute project directory
    pub project_dir: PathBuf,

    /// Configuration exactly as loaded (empty if loading failed)
    pub persisted: PersistedConfig,

    /// Flags given on the command line
    pub flags: RunArgs,

    /// Persisted configuration with the command-line flags applied
    pub merged: PersistedConfig,
}

impl MergedState {
    pub fn watch_requested(&self) -> bool {
        self.merged.watch == Some(true)
    }

    pub fn tap_requested(&self) -> bool {
        self.merged.tap == Some(true)
    }

    /// TAP was asked for on the command line but not in the persisted configuration
    pub fn tap_requested_ad_hoc(&self) -> bool {
        self.flags.tap == Some(true) && self.persisted.tap != Some(true)
    }
}

/// Outcome of resolving the configuration sources
///
/// A load failure does not stop resolution: the error is kept aside so that
/// invocations which do not need configuration can still run. It is reported
/// by the validator.
#[derive(Debug)]
pub struct Resolution {
    pub state: MergedState,
    pub load_error: Option<ConfigError>,
}

impl Resolution {
    pub fn resolve(cwd: &Path, config_path: Option<&Path>, flags: RunArgs) -> Self {
        let project_dir = find_project_dir(cwd);

        let (persisted, load_error) = match load(&project_dir, cwd, config_path) {
            Ok(config) => (config, None),
            Err(err) => {
                debug!(error = %err, "Deferring configuration error");
                (PersistedConfig::default(), Some(err))
            }
        };

        let merged = merge(&persisted, &flags);

        Self {
            state: MergedState {
                project_dir,
                persisted,
                flags,
                merged,
            },
            load_error,
        }
    }
}
