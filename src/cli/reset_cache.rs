//! `reset-cache` command

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::fs;
use tracing::debug;

use crate::config::cache_dir;
use crate::error::Fatal;

/// Empty the project's cache directory, keeping the directory itself
pub async fn execute(project_dir: &Path) -> Result<u8, Fatal> {
    let dir = cache_dir(project_dir);

    let removed = remove_contents(&dir).await.map_err(|err| Fatal::ResetCache {
        dir: dir.clone(),
        source: err.into(),
    })?;

    if removed == 0 {
        println!("\n  {} No cache files to remove\n", "✔".green());
    } else {
        println!(
            "\n  {} Removed trial cache files in {}\n",
            "✔".green(),
            dir.display()
        );
    }
    Ok(0)
}

/// Remove every entry of `dir`, returning how many were removed
async fn remove_contents(dir: &Path) -> Result<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", dir.display()))
        }
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let removal = if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        removal.with_context(|| format!("Failed to remove {}", path.display()))?;
        debug!("Removed {}", path.display());
        removed += 1;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_cache_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(remove_contents(&cache_dir(dir.path())).await.unwrap(), 0);
        assert_eq!(execute(dir.path()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_removes_nested_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache_dir(dir.path());
        std_fs::create_dir_all(cache.join("nested/deeper")).unwrap();
        std_fs::write(cache.join("a.json"), "{}").unwrap();
        std_fs::write(cache.join("nested/deeper/b.json"), "{}").unwrap();

        assert_eq!(remove_contents(&cache).await.unwrap(), 2);
        assert!(cache.is_dir());
        assert_eq!(std_fs::read_dir(&cache).unwrap().count(), 0);

        // Idempotent on the now-empty directory
        assert_eq!(remove_contents(&cache).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_cache_is_fatal() {
        let dir = TempDir::new().unwrap();
        let cache = cache_dir(dir.path());
        std_fs::create_dir_all(cache.parent().unwrap()).unwrap();
        // A file where the directory should be
        std_fs::write(&cache, "").unwrap();

        let err = execute(dir.path()).await.unwrap_err();
        assert!(err.to_string().starts_with("Error removing trial cache files in"));
    }
}
