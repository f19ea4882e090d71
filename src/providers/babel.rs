//! Babel provider: workers compile test files with `@babel/core`

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{extension_list, Provider, ProviderKind, ProviderLevel};

const SUPPORTED_CORE: &str = "^7.0.0";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BabelOptions {
    /// Helper globs compiled like test files
    #[serde(default)]
    compile_as_tests: Vec<String>,

    #[serde(default)]
    extensions: Option<Vec<String>>,

    /// Babel options applied to test files
    #[serde(default)]
    test_options: Option<Value>,
}

#[derive(Debug)]
pub struct BabelProvider {
    core_version: Version,
    compile_as_tests: Vec<String>,
    extensions: Vec<String>,
    test_options: Value,
}

impl BabelProvider {
    pub fn load(project_dir: &Path, config: &Value) -> Result<Self> {
        let options: BabelOptions = serde_json::from_value(config.clone())
            .context("Unexpected 'babel' provider configuration")?;

        let manifest = project_dir.join("node_modules/@babel/core/package.json");
        if !manifest.is_file() {
            bail!(
                "Could not find @babel/core, which the babel provider requires. Install it with `npm install --save-dev @babel/core`."
            );
        }

        let content = fs::read_to_string(&manifest)
            .with_context(|| format!("Failed to read {}", manifest.display()))?;
        let pkg: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", manifest.display()))?;
        let core_version = pkg
            .get("version")
            .and_then(Value::as_str)
            .and_then(|v| Version::parse(v).ok())
            .with_context(|| format!("No valid version in {}", manifest.display()))?;

        let required = VersionReq::parse(SUPPORTED_CORE)?;
        if !required.matches(&core_version) {
            bail!(
                "The babel provider requires @babel/core {}, found {}.",
                SUPPORTED_CORE,
                core_version
            );
        }

        Ok(Self {
            core_version,
            compile_as_tests: options.compile_as_tests,
            extensions: extension_list(options.extensions, &["js"], "babel")?,
            test_options: options.test_options.unwrap_or_else(|| json!({})),
        })
    }
}

#[async_trait]
impl Provider for BabelProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Babel
    }

    fn level(&self) -> ProviderLevel {
        ProviderLevel::Compile
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn worker_options(&self) -> Value {
        json!({
            "type": ProviderKind::Babel.name(),
            "coreVersion": self.core_version.to_string(),
            "compileAsTests": self.compile_as_tests,
            "extensions": self.extensions,
            "testOptions": self.test_options,
        })
    }
}
