use std::collections::BTreeSet;

use serde_json::Value;

use crate::providers::Providers;

/// Extensions recognized when none are configured
const DEFAULT_EXTENSIONS: &[&str] = &["cjs", "mjs", "js"];

/// Combine configured and provider extensions into the effective list
///
/// An extension may be claimed only once across the configuration and the
/// active providers.
pub fn normalize_extensions(
    configured: Option<&Value>,
    providers: &Providers,
) -> Result<Vec<String>, String> {
    let configured = match configured {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| match item.as_str() {
                    Some(ext) if !ext.is_empty() && !ext.starts_with('.') => Ok(ext.to_string()),
                    _ => Err(()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    "The 'extensions' configuration must be an array of extensions without a leading dot."
                        .to_string()
                })?,
        ),
        Some(_) => {
            return Err("The 'extensions' configuration must be an array of strings.".to_string())
        }
    };

    let mut all = Vec::new();
    let mut seen = BTreeSet::new();
    let mut duplicates = Vec::new();

    let declared = configured
        .iter()
        .flatten()
        .cloned()
        .chain(providers.iter().flat_map(|p| p.extensions().to_vec()));
    for ext in declared {
        if seen.insert(ext.clone()) {
            all.push(ext);
        } else if !duplicates.contains(&ext) {
            duplicates.push(ext);
        }
    }

    if !duplicates.is_empty() {
        return Err(format!(
            "Unexpected duplicate extensions in options: '{}'.",
            duplicates.join("', '")
        ));
    }

    if configured.is_none() {
        for ext in DEFAULT_EXTENSIONS {
            if seen.insert(ext.to_string()) {
                all.push(ext.to_string());
            }
        }
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistedConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn typescript() -> (TempDir, Providers) {
        let dir = TempDir::new().unwrap();
        let config = PersistedConfig {
            typescript: Some(json!({"rewritePaths": {"src/": "build/"}})),
            ..PersistedConfig::default()
        };
        let providers = Providers::load(dir.path(), &config).unwrap();
        (dir, providers)
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            normalize_extensions(None, &Providers::default()).unwrap(),
            vec!["cjs", "mjs", "js"]
        );
    }

    #[test]
    fn test_configured_list_replaces_defaults() {
        assert_eq!(
            normalize_extensions(Some(&json!(["js", "jsx"])), &Providers::default()).unwrap(),
            vec!["js", "jsx"]
        );
    }

    #[test]
    fn test_provider_extensions_are_added() {
        let (_dir, providers) = typescript();
        assert_eq!(
            normalize_extensions(None, &providers).unwrap(),
            vec!["ts", "cjs", "mjs", "js"]
        );
    }

    #[test]
    fn test_duplicates_are_fatal() {
        let (_dir, providers) = typescript();
        assert_eq!(
            normalize_extensions(Some(&json!(["ts", "js"])), &providers).unwrap_err(),
            "Unexpected duplicate extensions in options: 'ts'."
        );
        assert_eq!(
            normalize_extensions(Some(&json!(["js", "js"])), &Providers::default()).unwrap_err(),
            "Unexpected duplicate extensions in options: 'js'."
        );
    }

    #[test]
    fn test_rejects_dotted_extensions() {
        assert!(normalize_extensions(Some(&json!([".js"])), &Providers::default()).is_err());
        assert!(normalize_extensions(Some(&json!("js")), &Providers::default()).is_err());
    }
}
