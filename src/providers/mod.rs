//! Source-transform providers
//!
//! A provider lets test files be written in a language workers cannot load
//! directly. Each provider is declared by its own configuration key
//! (`babel`, `typescript`), contributes file extensions and glob tweaks, and
//! reports a capability level that decides which hooks the runner uses.

mod babel;
mod typescript;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::PersistedConfig;

pub use babel::BabelProvider;
pub use typescript::TypescriptProvider;

/// Which integration a provider implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Babel,
    Typescript,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Babel => "babel",
            ProviderKind::Typescript => "typescript",
        }
    }
}

/// Capabilities a provider offers, in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderLevel {
    /// Workers compile files in-process
    Compile,
    /// Test files map onto prebuilt output files
    PathRewrites,
}

/// Provider trait - implemented by each source-transform integration
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    fn level(&self) -> ProviderLevel;

    /// Extensions of test files handled by this provider
    fn extensions(&self) -> &[String];

    /// Adjust the test-file and watcher-ignore glob patterns
    fn update_globs(&self, _files: &mut Vec<String>, _ignored_by_watcher: &mut Vec<String>) {}

    /// Whether a change to this project-relative path should not trigger a re-run
    fn ignore_change(&self, _relative: &Path) -> bool {
        false
    }

    /// Map a project-relative test file onto the file a worker should load
    fn resolve_test_file(&self, _relative: &Path) -> Option<PathBuf> {
        None
    }

    /// Options forwarded to worker processes
    fn worker_options(&self) -> Value;

    /// Called before every run
    async fn compile(&self) -> Result<()> {
        Ok(())
    }
}

/// The providers active for one invocation
#[derive(Debug, Clone, Default)]
pub struct Providers {
    providers: Vec<Arc<dyn Provider>>,
}

impl Providers {
    /// Resolve every provider declared in the configuration
    ///
    /// A provider is declared when its key is present and not `false`;
    /// `true` declares it with default options.
    pub fn load(project_dir: &Path, config: &PersistedConfig) -> Result<Self> {
        let mut providers = Self::default();

        if let Some(options) = declared(config.babel.as_ref()) {
            providers.register(Arc::new(BabelProvider::load(project_dir, &options)?));
        }

        if let Some(options) = declared(config.typescript.as_ref()) {
            providers.register(Arc::new(TypescriptProvider::load(project_dir, &options)?));
        }

        Ok(providers)
    }

    /// Register a provider
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        debug!(
            "Using {} provider at level {:?}",
            provider.kind().name(),
            provider.level()
        );
        self.providers.push(provider);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run update_globs hooks
    pub fn update_globs(&self, files: &mut Vec<String>, ignored_by_watcher: &mut Vec<String>) {
        for provider in &self.providers {
            provider.update_globs(files, ignored_by_watcher);
        }
    }

    /// Run ignore_change hooks
    pub fn ignore_change(&self, relative: &Path) -> bool {
        self.providers.iter().any(|p| p.ignore_change(relative))
    }

    /// Run resolve_test_file hooks of providers that rewrite paths
    pub fn resolve_test_file(&self, relative: &Path) -> Option<PathBuf> {
        self.providers
            .iter()
            .filter(|p| p.level() >= ProviderLevel::PathRewrites)
            .find_map(|p| p.resolve_test_file(relative))
    }

    /// Run compile hooks
    pub async fn compile(&self) -> Result<()> {
        for provider in &self.providers {
            provider.compile().await?;
        }
        Ok(())
    }

    /// Options for every provider, as forwarded to workers
    pub fn worker_options(&self) -> Vec<Value> {
        self.providers.iter().map(|p| p.worker_options()).collect()
    }
}

fn declared(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::Bool(true)) => Some(Value::Object(Default::default())),
        Some(other) => Some(other.clone()),
    }
}

/// Parse a provider's `extensions` option
fn extension_list(value: Option<Vec<String>>, default: &[&str], provider: &str) -> Result<Vec<String>> {
    let extensions = value.unwrap_or_else(|| default.iter().map(|e| e.to_string()).collect());
    if extensions.is_empty() || extensions.iter().any(|e| e.is_empty() || e.starts_with('.')) {
        anyhow::bail!(
            "The '{}' provider's 'extensions' option must be a non-empty list of extensions without a leading dot.",
            provider
        );
    }
    Ok(extensions)
}
