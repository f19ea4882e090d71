//! Test-file and watcher glob patterns

use std::path::Path;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::Value;

use crate::providers::Providers;
use crate::utils::to_slash;

/// Never test files, whatever the configuration says
const ALWAYS_EXCLUDED: &[&str] = &[
    "**/node_modules/**",
    "**/fixtures/**",
    "**/helpers/**",
    "**/_*",
    "**/_*/**",
];

/// Changes the watcher never reacts to
const DEFAULT_WATCHER_IGNORES: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/.nyc_output/**",
    "**/coverage/**",
    "**/*.snap",
    "**/*.snap.md",
];

/// Effective glob patterns for discovery and watching
#[derive(Debug, Clone)]
pub struct Globs {
    pub extensions: Vec<String>,
    pub file_patterns: Vec<String>,
    pub ignored_by_watcher_patterns: Vec<String>,
    include: GlobSet,
    exclude: GlobSet,
    watcher_ignore: GlobSet,
}

impl Default for Globs {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            file_patterns: Vec::new(),
            ignored_by_watcher_patterns: Vec::new(),
            include: GlobSet::empty(),
            exclude: GlobSet::empty(),
            watcher_ignore: GlobSet::empty(),
        }
    }
}

impl Globs {
    /// Normalize the `files` and `ignoredByWatcher` configuration
    pub fn build(
        files: Option<&Value>,
        ignored_by_watcher: Option<&Value>,
        extensions: &[String],
        providers: &Providers,
    ) -> Result<Self, String> {
        let mut file_patterns = match pattern_list(files, "files")? {
            Some(patterns) => patterns,
            None => default_test_patterns(extensions),
        };
        let mut ignored_patterns = pattern_list(ignored_by_watcher, "ignoredByWatcher")?
            .unwrap_or_default();

        providers.update_globs(&mut file_patterns, &mut ignored_patterns);

        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();
        for pattern in ALWAYS_EXCLUDED {
            exclude.add(compile(pattern)?);
        }
        for pattern in &file_patterns {
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.add(compile(&expand_directory(negated))?),
                None => include.add(compile(&expand_directory(pattern))?),
            };
        }

        let mut watcher_ignore = GlobSetBuilder::new();
        for pattern in DEFAULT_WATCHER_IGNORES
            .iter()
            .copied()
            .chain(ignored_patterns.iter().map(String::as_str))
        {
            watcher_ignore.add(compile(&expand_directory(pattern))?);
        }

        Ok(Self {
            extensions: extensions.to_vec(),
            file_patterns,
            ignored_by_watcher_patterns: ignored_patterns,
            include: finish(include)?,
            exclude: finish(exclude)?,
            watcher_ignore: finish(watcher_ignore)?,
        })
    }

    /// Whether a project-relative path is a test file
    pub fn is_test_file(&self, relative: &Path) -> bool {
        let has_extension = relative
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));
        if !has_extension {
            return false;
        }

        let slashed = to_slash(relative);
        self.include.is_match(&slashed) && !self.exclude.is_match(&slashed)
    }

    /// Whether a change to a project-relative path is ignored by the watcher
    pub fn is_ignored_by_watcher(&self, relative: &Path) -> bool {
        self.watcher_ignore.is_match(to_slash(relative))
    }
}

fn pattern_list(value: Option<&Value>, key: &str) -> Result<Option<Vec<String>>, String> {
    let invalid = || {
        format!(
            "The '{}' configuration must be an array containing glob patterns.",
            key
        )
    };

    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid()),
    };
    if items.is_empty() {
        return Err(format!("The '{}' configuration must not be empty.", key));
    }

    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn default_test_patterns(extensions: &[String]) -> Vec<String> {
    let ext = match extensions {
        [single] => single.clone(),
        many => format!("{{{}}}", many.join(",")),
    };

    [
        "test.",
        "src/test.",
        "source/test.",
        "**/test-*.",
        "**/*.spec.",
        "**/*.test.",
        "**/test/**/*.",
        "**/tests/**/*.",
        "**/__tests__/**/*.",
    ]
    .iter()
    .map(|prefix| format!("{}{}", prefix, ext))
    .collect()
}

/// A bare directory pattern matches everything below it
fn expand_directory(pattern: &str) -> String {
    if pattern.ends_with('/') {
        format!("{}**/*", pattern)
    } else {
        pattern.to_string()
    }
}

fn compile(pattern: &str) -> Result<Glob, String> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|err| format!("Invalid glob pattern '{}': {}", pattern, err))
}

fn finish(builder: GlobSetBuilder) -> Result<GlobSet, String> {
    builder.build().map_err(|err| err.to_string())
}
