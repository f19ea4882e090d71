//! Error types surfaced to the user
//!
//! Every fatal path in the runner funnels into [`Fatal`]. Only the binary's
//! entrypoint turns a `Fatal` into output and a process exit code.

use std::error::Error as StdError;
use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

/// Boxed error used as a parent cause
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure while loading the persisted configuration
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,

    #[source]
    parent: Option<BoxError>,
}

impl ConfigError {
    /// Create an error without a parent cause
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            parent: None,
        }
    }

    /// Create an error caused by another error
    pub fn with_parent(message: impl Into<String>, parent: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            parent: Some(parent.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn parent(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.parent.as_deref()
    }
}

/// A condition that terminates the invocation with exit code 1
#[derive(Debug, Error)]
pub enum Fatal {
    /// The persisted configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An option combination or value was rejected
    #[error("{0}")]
    Validation(String),

    /// A derived input (providers, globs, extensions, ...) could not be prepared
    #[error("{0}")]
    Preparation(String),

    /// The cache directory could not be cleared
    #[error("Error removing trial cache files in {}", dir.display())]
    ResetCache {
        dir: PathBuf,
        #[source]
        source: BoxError,
    },

    /// A debug run resolved to anything other than exactly one file
    #[error("Provide the path to the test file you wish to debug")]
    DebugWithoutSingleFile,

    /// The execution engine failed outside of the tests themselves
    #[error("{0:#}")]
    Engine(anyhow::Error),
}

impl Fatal {
    /// Render the headline followed by the dimmed cause trace, if any
    pub fn render(&self) -> String {
        let mut causes = Vec::new();
        let mut next = match self {
            // The transparent variant forwards `source()` to the config error's own
            // parent, so start from there to avoid repeating the headline.
            Fatal::Config(err) => err.parent().map(|p| p as &(dyn StdError + 'static)),
            other => other.source(),
        };

        while let Some(cause) = next {
            causes.push(cause.to_string());
            next = cause.source();
        }

        if causes.is_empty() {
            self.to_string()
        } else {
            format!("{}\n\n{}", self, causes.join("\n").dimmed())
        }
    }
}
