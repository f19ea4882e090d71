//! TypeScript provider: test files run from their compiled output

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::info;

use super::{extension_list, Provider, ProviderKind, ProviderLevel};
use crate::utils::to_slash;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TypescriptOptions {
    /// Source directory to build directory, both ending in `/`
    #[serde(default)]
    rewrite_paths: BTreeMap<String, String>,

    /// `false` or `"tsc"`
    #[serde(default)]
    compile: Option<Value>,

    #[serde(default)]
    extensions: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct TypescriptProvider {
    project_dir: PathBuf,
    rewrite_paths: Vec<(String, String)>,
    compiler: Option<PathBuf>,
    extensions: Vec<String>,
}

impl TypescriptProvider {
    pub fn load(project_dir: &Path, config: &Value) -> Result<Self> {
        let options: TypescriptOptions = serde_json::from_value(config.clone())
            .context("Unexpected 'typescript' provider configuration")?;

        if options.rewrite_paths.is_empty() {
            bail!("The 'typescript' provider requires 'rewritePaths' to map source directories onto build directories.");
        }
        for (from, to) in &options.rewrite_paths {
            if !from.ends_with('/') || !to.ends_with('/') {
                bail!(
                    "Keys and values of 'rewritePaths' must end with a '/', got '{}': '{}'.",
                    from,
                    to
                );
            }
        }

        let compiler = match options.compile {
            None | Some(Value::Bool(false)) => None,
            Some(Value::String(ref tool)) if tool == "tsc" => {
                let tsc = project_dir.join("node_modules/.bin/tsc");
                if !tsc.is_file() {
                    bail!("Could not find the TypeScript compiler. Install it with `npm install --save-dev typescript`, or set 'compile' to false.");
                }
                Some(tsc)
            }
            Some(other) => bail!(
                "The 'compile' option of the 'typescript' provider must be false or \"tsc\", got {}.",
                other
            ),
        };

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            rewrite_paths: options.rewrite_paths.into_iter().collect(),
            compiler,
            extensions: extension_list(options.extensions, &["ts"], "typescript")?,
        })
    }

    fn has_extension(&self, relative: &Path) -> bool {
        relative
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

/// Extension of the compiled counterpart of a source extension
fn output_extension(ext: &str) -> &'static str {
    match ext {
        "mts" => "mjs",
        "cts" => "cjs",
        _ => "js",
    }
}

#[async_trait]
impl Provider for TypescriptProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Typescript
    }

    fn level(&self) -> ProviderLevel {
        ProviderLevel::PathRewrites
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn update_globs(&self, files: &mut Vec<String>, ignored_by_watcher: &mut Vec<String>) {
        files.push("!**/*.d.ts".to_string());
        for (_, to) in &self.rewrite_paths {
            files.push(format!("!{}**", to));
            ignored_by_watcher.push(format!("{}**/*.js.map", to));
        }
    }

    fn ignore_change(&self, relative: &Path) -> bool {
        // Without our own compile step the build output is what changes.
        if self.compiler.is_some() || !self.has_extension(relative) {
            return false;
        }
        let relative = to_slash(relative);
        self.rewrite_paths
            .iter()
            .any(|(from, _)| relative.starts_with(from.as_str()))
    }

    fn resolve_test_file(&self, relative: &Path) -> Option<PathBuf> {
        if !self.has_extension(relative) {
            return None;
        }
        let slashed = to_slash(relative);
        let (from, to) = self
            .rewrite_paths
            .iter()
            .find(|(from, _)| slashed.starts_with(from.as_str()))?;

        let ext = relative.extension()?.to_str()?;
        let rewritten = PathBuf::from(format!("{}{}", to, &slashed[from.len()..]));
        Some(rewritten.with_extension(output_extension(ext)))
    }

    fn worker_options(&self) -> Value {
        json!({
            "type": ProviderKind::Typescript.name(),
            "extensions": self.extensions,
            "rewritePaths": self.rewrite_paths.iter().cloned().collect::<BTreeMap<_, _>>(),
        })
    }

    async fn compile(&self) -> Result<()> {
        let Some(tsc) = &self.compiler else {
            return Ok(());
        };

        info!("Compiling TypeScript with {}", tsc.display());
        let output = Command::new(tsc)
            .args(["--incremental", "false"])
            .current_dir(&self.project_dir)
            .output()
            .await
            .with_context(|| format!("Failed to launch {}", tsc.display()))?;

        if !output.status.success() {
            bail!(
                "TypeScript compilation failed:\n{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }
}
