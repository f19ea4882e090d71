use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::utils::{clean_path, relative_path, to_slash};

/// `path:selector` where the selector looks like a list of lines or ranges
static LINE_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?):([0-9][0-9,\-\s]*)$").unwrap());

static SELECTOR_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap());

/// A positional file pattern, relative to the project directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePattern {
    pub pattern: String,
    /// Lines whose tests should run; empty means all
    pub line_numbers: Vec<u32>,
}

impl FilePattern {
    /// Parse a pattern as given on the command line
    pub fn parse(raw: &str, cwd: &Path, project_dir: &Path) -> Result<Self, String> {
        let (path, line_numbers) = match LINE_SELECTOR.captures(raw) {
            Some(captures) => (
                captures[1].to_string(),
                parse_selector(&captures[2], raw)?,
            ),
            None => (raw.to_string(), Vec::new()),
        };

        let absolute = cwd.join(&path);
        let pattern = relative_path(project_dir, Path::new(&clean_path(&to_slash(&absolute))));

        Ok(Self {
            pattern,
            line_numbers,
        })
    }

    pub fn has_glob(&self) -> bool {
        self.pattern.contains(['*', '?', '[', '{'])
    }
}

/// Parse `4,7-9` into sorted, deduplicated line numbers
fn parse_selector(selector: &str, raw: &str) -> Result<Vec<u32>, String> {
    let invalid = || format!("Invalid line number selector in '{}'.", raw);

    let mut lines = Vec::new();
    for part in selector.split(',') {
        let captures = SELECTOR_PART.captures(part.trim()).ok_or_else(invalid)?;
        let start: u32 = captures[1].parse().map_err(|_| invalid())?;
        let end: u32 = match captures.get(2) {
            Some(end) => end.as_str().parse().map_err(|_| invalid())?,
            None => start,
        };
        if start == 0 || end < start {
            return Err(invalid());
        }
        lines.extend(start..=end);
    }

    lines.sort_unstable();
    lines.dedup();
    Ok(lines)
}
