//! Turns the configured directory list into concrete note roots.

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::config::PathSpec;
use crate::error::{NotesError, Result};

/// Evaluate every spec in order, splicing list-valued results in place.
/// Duplicates are kept; `filter_existing` removes them.
pub fn resolve(configured: &[PathSpec]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::with_capacity(configured.len());
    for spec in configured {
        for raw in evaluate(spec)? {
            resolved.push(absolutize(&raw)?);
        }
    }
    Ok(resolved)
}

/// Keep entries that currently exist as directories, first occurrence wins.
pub fn filter_existing(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|p| p.is_dir())
        .filter(|p| seen.insert((*p).clone()))
        .cloned()
        .collect()
}

/// `resolve` followed by `filter_existing`.
pub fn resolve_existing(configured: &[PathSpec]) -> Result<Vec<PathBuf>> {
    let resolved = resolve(configured)?;
    let existing = filter_existing(&resolved);
    if existing.len() < resolved.len() {
        log::debug!(
            "[Resolver] {} of {} configured directories kept",
            existing.len(),
            resolved.len()
        );
    }
    Ok(existing)
}

fn evaluate(spec: &PathSpec) -> Result<Vec<String>> {
    match spec {
        PathSpec::Literal(s) => Ok(vec![s.clone()]),
        PathSpec::Env(name) => {
            let value = env::var_os(name).ok_or_else(|| {
                NotesError::Configuration(format!("environment variable {} is not set", name))
            })?;
            Ok(env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().to_string())
                .collect())
        }
        PathSpec::Deferred(thunk) => from_value(thunk()),
    }
}

fn from_value(value: serde_yaml::Value) -> Result<Vec<String>> {
    match value {
        serde_yaml::Value::String(s) => Ok(vec![s]),
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                serde_yaml::Value::String(s) => Ok(s),
                other => Err(NotesError::Configuration(format!(
                    "directory list entry must be a string, got {:?}",
                    other
                ))),
            })
            .collect(),
        other => Err(NotesError::Configuration(format!(
            "directory expression must yield a string or list of strings, got {:?}",
            other
        ))),
    }
}

fn absolutize(raw: &str) -> Result<PathBuf> {
    let expanded = expand_home(raw);
    let path = if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()?.join(expanded)
    };
    // Drops trailing separators and `.` segments so equal roots compare equal.
    Ok(path.components().collect())
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" || raw.starts_with("~/") {
        if let Ok(home) = env::var("HOME") {
            return Path::new(&home).join(raw[1..].trim_start_matches('/'));
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_preserves_order_and_splices_lists() {
        let spec = vec![
            PathSpec::literal("/a"),
            PathSpec::deferred(|| {
                serde_yaml::Value::Sequence(vec![
                    serde_yaml::Value::String("/b".to_string()),
                    serde_yaml::Value::String("/c".to_string()),
                ])
            }),
            PathSpec::literal("/a/"),
        ];
        let resolved = resolve(&spec).unwrap();
        assert_eq!(
            resolved,
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b"),
                PathBuf::from("/c"),
                PathBuf::from("/a"),
            ]
        );
    }

    #[test]
    fn test_deferred_non_string_is_configuration_error() {
        let spec = vec![PathSpec::deferred(|| serde_yaml::Value::Bool(true))];
        assert!(matches!(resolve(&spec), Err(NotesError::Configuration(_))));

        let spec = vec![PathSpec::deferred(|| {
            serde_yaml::Value::Sequence(vec![serde_yaml::Value::Number(3.into())])
        })];
        assert!(matches!(resolve(&spec), Err(NotesError::Configuration(_))));
    }

    #[test]
    fn test_deferred_is_evaluated_at_resolution_time() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let spec = vec![PathSpec::deferred(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            serde_yaml::Value::String("/x".to_string())
        })];
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        resolve(&spec).unwrap();
        resolve(&spec).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let resolved = resolve(&[PathSpec::literal("notes")]).unwrap();
        assert!(resolved[0].is_absolute());
        assert!(resolved[0].ends_with("notes"));
    }

    #[test]
    fn test_filter_existing_drops_missing_and_duplicates() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        let file = temp.path().join("file.org");
        fs::write(&file, "x").unwrap();

        let input = vec![
            b.clone(),
            temp.path().join("missing"),
            a.clone(),
            file,
            b.clone(),
        ];
        assert_eq!(filter_existing(&input), vec![b, a]);
    }
}
