use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::ParseConfig;
use crate::error::{NotesError, Result};
use crate::parser::{collapse_whitespace, parse_with};

/// Parsed metadata for one note. `mtime` is the modification time the other
/// fields were derived from; entries are only ever replaced whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub mtime: SystemTime,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub keywords: Option<String>,
    pub searchable_text: String,
}

impl CacheEntry {
    pub fn display_summary(&self) -> Option<String> {
        self.summary.as_deref().map(collapse_whitespace)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No file on disk. Any existing entry is left alone.
    Missing,
    /// Cached mtime is current.
    Unchanged,
    Updated,
}

enum Probe {
    Missing,
    Unchanged,
    Loaded(CacheEntry),
}

pub struct MetadataCache {
    entries: HashMap<PathBuf, CacheEntry>,
    parse: ParseConfig,
}

impl MetadataCache {
    pub fn new(parse: ParseConfig) -> Self {
        Self {
            entries: HashMap::new(),
            parse,
        }
    }

    /// Re-read `path` if its on-disk mtime is newer than the cached one.
    /// A read failure leaves the previous entry untouched.
    pub fn refresh(&mut self, path: &Path) -> Result<RefreshOutcome> {
        let probe = self.probe(path)?;
        Ok(self.apply(path, probe))
    }

    /// Refresh many paths: stat and parse in parallel, then update the map
    /// sequentially. Results line up with `paths`.
    pub fn refresh_all(&mut self, paths: &[PathBuf]) -> Vec<Result<RefreshOutcome>> {
        let probes: Vec<Result<Probe>> = paths.par_iter().map(|p| self.probe(p)).collect();

        let mut updated = 0usize;
        let results: Vec<Result<RefreshOutcome>> = paths
            .iter()
            .zip(probes)
            .map(|(path, probe)| {
                let outcome = self.apply(path, probe?);
                if outcome == RefreshOutcome::Updated {
                    updated += 1;
                }
                Ok(outcome)
            })
            .collect();

        if updated > 0 {
            log::debug!("[Cache] Re-parsed {} of {} files", updated, paths.len());
        }
        results
    }

    pub fn lookup(&self, path: &Path) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// Drop entries whose file is gone and return their paths.
    pub fn invalidate_missing(&mut self) -> Vec<PathBuf> {
        let missing: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|path| !path.is_file())
            .cloned()
            .collect();
        for path in &missing {
            self.entries.remove(path);
        }
        if !missing.is_empty() {
            log::info!("[Cache] Evicted {} entries for deleted files", missing.len());
        }
        missing
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn probe(&self, path: &Path) -> Result<Probe> {
        let Some(mtime) = disk_mtime(path)? else {
            return Ok(Probe::Missing);
        };
        if let Some(entry) = self.entries.get(path) {
            if entry.mtime >= mtime {
                return Ok(Probe::Unchanged);
            }
        }
        load_entry(path, mtime, &self.parse).map(Probe::Loaded)
    }

    fn apply(&mut self, path: &Path, probe: Probe) -> RefreshOutcome {
        match probe {
            Probe::Missing => RefreshOutcome::Missing,
            Probe::Unchanged => RefreshOutcome::Unchanged,
            Probe::Loaded(entry) => {
                log::debug!("[Cache] Updated {:?}", path);
                self.entries.insert(path.to_path_buf(), entry);
                RefreshOutcome::Updated
            }
        }
    }
}

/// Modification time of a regular file, `None` when there is no such file.
pub fn disk_mtime(path: &Path) -> Result<Option<SystemTime>> {
    let read_failure = |source: std::io::Error| NotesError::ReadFailure {
        path: path.to_path_buf(),
        source,
    };
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(read_failure(e)),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    metadata.modified().map(Some).map_err(read_failure)
}

fn load_entry(path: &Path, mtime: SystemTime, options: &ParseConfig) -> Result<CacheEntry> {
    let bytes = fs::read(path).map_err(|source| NotesError::ReadFailure {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let parsed = parse_with(&content, options);

    let path_text = path.to_string_lossy();
    let searchable_text = [
        Some(&*path_text),
        parsed.title.as_deref(),
        parsed.keywords.as_deref(),
        parsed.summary.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("\n");

    Ok(CacheEntry {
        mtime,
        title: parsed.title,
        summary: parsed.summary,
        keywords: parsed.keywords,
        searchable_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_with_mtime(path: &Path, content: &str, mtime: SystemTime) {
        fs::write(path, content).unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    fn base_time() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_refresh_parses_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.org");
        write_with_mtime(&path, "Hello\n\nWorld", base_time());

        let mut cache = MetadataCache::new(ParseConfig::default());
        assert_eq!(cache.refresh(&path).unwrap(), RefreshOutcome::Updated);
        let first = cache.lookup(&path).cloned().unwrap();
        assert_eq!(first.title.as_deref(), Some("Hello"));
        assert_eq!(first.summary.as_deref(), Some("World"));
        assert_eq!(first.mtime, base_time());
        assert!(first.searchable_text.contains("a.org"));
        assert!(first.searchable_text.contains("World"));

        assert_eq!(cache.refresh(&path).unwrap(), RefreshOutcome::Unchanged);
        assert_eq!(cache.lookup(&path), Some(&first));
    }

    #[test]
    fn test_refresh_only_when_strictly_newer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.org");
        write_with_mtime(&path, "Old", base_time());

        let mut cache = MetadataCache::new(ParseConfig::default());
        cache.refresh(&path).unwrap();

        // Same mtime, different content: not re-read.
        write_with_mtime(&path, "Changed", base_time());
        assert_eq!(cache.refresh(&path).unwrap(), RefreshOutcome::Unchanged);
        assert_eq!(cache.lookup(&path).unwrap().title.as_deref(), Some("Old"));

        write_with_mtime(&path, "New", base_time() + Duration::from_secs(5));
        assert_eq!(cache.refresh(&path).unwrap(), RefreshOutcome::Updated);
        let entry = cache.lookup(&path).unwrap();
        assert_eq!(entry.title.as_deref(), Some("New"));
        assert_eq!(entry.mtime, base_time() + Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_keeps_stale_entry_until_invalidated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone.org");
        write_with_mtime(&path, "Bye", base_time());

        let mut cache = MetadataCache::new(ParseConfig::default());
        cache.refresh(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(cache.refresh(&path).unwrap(), RefreshOutcome::Missing);
        assert!(cache.lookup(&path).is_some());

        assert_eq!(cache.invalidate_missing(), vec![path.clone()]);
        assert!(cache.lookup(&path).is_none());
        assert!(cache.invalidate_missing().is_empty());
    }

    #[test]
    fn test_directory_is_not_a_note() {
        let temp = TempDir::new().unwrap();
        let mut cache = MetadataCache::new(ParseConfig::default());
        assert_eq!(cache.refresh(temp.path()).unwrap(), RefreshOutcome::Missing);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_refresh_all_matches_inputs() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.org");
        let b = temp.path().join("b.org");
        write_with_mtime(&a, "A", base_time());
        write_with_mtime(&b, "B", base_time());
        let missing = temp.path().join("missing.org");

        let mut cache = MetadataCache::new(ParseConfig::default());
        cache.refresh(&a).unwrap();

        let results = cache.refresh_all(&[a.clone(), b.clone(), missing]);
        let outcomes: Vec<RefreshOutcome> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            outcomes,
            vec![
                RefreshOutcome::Unchanged,
                RefreshOutcome::Updated,
                RefreshOutcome::Missing
            ]
        );
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_read_lossily() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("latin1.org");
        fs::write(&path, b"caf\xe9\nbody").unwrap();
        let mut cache = MetadataCache::new(ParseConfig::default());
        cache.refresh(&path).unwrap();
        let entry = cache.lookup(&path).unwrap();
        assert!(entry.title.as_deref().unwrap().starts_with("caf"));
        assert_eq!(entry.summary.as_deref(), Some("body"));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_failure_preserves_previous_entry() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locked.org");
        write_with_mtime(&path, "Readable", base_time());

        let mut cache = MetadataCache::new(ParseConfig::default());
        cache.refresh(&path).unwrap();

        write_with_mtime(&path, "Now locked", base_time() + Duration::from_secs(1));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; only assert when the read really fails.
        if fs::read(&path).is_err() {
            let result = cache.refresh(&path);
            assert!(matches!(result, Err(NotesError::ReadFailure { .. })));
            let entry = cache.lookup(&path).unwrap();
            assert_eq!(entry.title.as_deref(), Some("Readable"));
            assert_eq!(entry.mtime, base_time());
        }
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    }
}
