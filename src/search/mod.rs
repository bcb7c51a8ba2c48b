pub mod index;
pub mod watcher;

use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::NotesConfig;
use crate::error::Result;
use crate::scan::Scanner;

use index::TantivyIndex;

/// External full-text index, consumed through two calls.
pub trait SearchIndexAdapter {
    /// (Re)index the given roots. Idempotent; `dirs` may be all roots or a subset.
    fn index_directories(&mut self, dirs: &[PathBuf]) -> Result<()>;

    /// Files under `dirs` matching `query`: most relevant first for a
    /// non-empty query, newest first otherwise.
    fn search(&mut self, dirs: &[PathBuf], query: Option<&str>) -> Result<Vec<PathBuf>>;
}

/// Where the candidate file set comes from. Chosen once, at configuration time.
pub trait CandidateSource {
    fn source_files(&mut self, dirs: &[PathBuf], query: Option<&str>) -> Result<Vec<PathBuf>>;

    /// True when `source_files` already returns display order, which the
    /// pipeline must then keep as is.
    fn is_ranked(&self) -> bool;

    /// Bring any backing index up to date for `dirs`.
    fn reindex(&mut self, dirs: &[PathBuf]) -> Result<()>;
}

/// Plain recursive scan of every root. Ignores the query.
pub struct FilesystemSource {
    scanner: Scanner,
}

impl FilesystemSource {
    pub fn new(scanner: Scanner) -> Self {
        Self { scanner }
    }
}

impl CandidateSource for FilesystemSource {
    fn source_files(&mut self, dirs: &[PathBuf], _query: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for dir in dirs {
            let mut found: Vec<PathBuf> = self.scanner.enumerate_absolute(dir).into_iter().collect();
            found.sort();
            // Nested roots would otherwise list the same file twice.
            files.extend(found.into_iter().filter(|p| seen.insert(p.clone())));
        }
        Ok(files)
    }

    fn is_ranked(&self) -> bool {
        false
    }

    fn reindex(&mut self, _dirs: &[PathBuf]) -> Result<()> {
        Ok(())
    }
}

/// Candidate files come from a search index, in the index's own order.
pub struct IndexedSource<A> {
    adapter: A,
    primed: bool,
}

impl<A: SearchIndexAdapter> IndexedSource<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            primed: false,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

impl<A: SearchIndexAdapter> CandidateSource for IndexedSource<A> {
    fn source_files(&mut self, dirs: &[PathBuf], query: Option<&str>) -> Result<Vec<PathBuf>> {
        if !self.primed {
            self.reindex(dirs)?;
        }
        self.adapter.search(dirs, query)
    }

    fn is_ranked(&self) -> bool {
        true
    }

    fn reindex(&mut self, dirs: &[PathBuf]) -> Result<()> {
        self.adapter.index_directories(dirs)?;
        self.primed = true;
        Ok(())
    }
}

/// Filesystem scanning, or the tantivy index when `index.enabled` is set.
pub fn source_from_config(config: &NotesConfig) -> Result<Box<dyn CandidateSource>> {
    let scanner = Scanner::new(config.extensions.clone());
    if !config.index.enabled {
        return Ok(Box::new(FilesystemSource::new(scanner)));
    }

    let index = match &config.index.path {
        Some(dir) => TantivyIndex::open(dir, scanner, config.parse.clone())?,
        None => TantivyIndex::in_memory(scanner, config.parse.clone())?,
    }
    .with_max_results(config.index.max_results);
    Ok(Box::new(IndexedSource::new(index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Extensions;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeAdapter {
        indexed: Vec<Vec<PathBuf>>,
        results: Vec<PathBuf>,
    }

    impl SearchIndexAdapter for FakeAdapter {
        fn index_directories(&mut self, dirs: &[PathBuf]) -> Result<()> {
            self.indexed.push(dirs.to_vec());
            Ok(())
        }

        fn search(&mut self, _dirs: &[PathBuf], _query: Option<&str>) -> Result<Vec<PathBuf>> {
            Ok(self.results.clone())
        }
    }

    #[test]
    fn test_filesystem_source_dedupes_nested_roots() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let nested = root.join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("a.org"), "a").unwrap();
        fs::write(nested.join("b.org"), "b").unwrap();

        let mut source = FilesystemSource::new(Scanner::new(Extensions::default()));
        let files = source
            .source_files(&[root.clone(), nested.clone()], Some("ignored"))
            .unwrap();
        assert_eq!(files, vec![root.join("a.org"), nested.join("b.org")]);
        assert!(!source.is_ranked());
    }

    #[test]
    fn test_indexed_source_primes_index_once() {
        let adapter = FakeAdapter {
            results: vec![PathBuf::from("/n/z.org"), PathBuf::from("/n/a.org")],
            ..Default::default()
        };
        let mut source = IndexedSource::new(adapter);
        let dirs = vec![PathBuf::from("/n")];

        let first = source.source_files(&dirs, None).unwrap();
        let second = source.source_files(&dirs, Some("q")).unwrap();
        assert_eq!(first, vec![PathBuf::from("/n/z.org"), PathBuf::from("/n/a.org")]);
        assert_eq!(first, second);
        assert_eq!(source.adapter().indexed.len(), 1);
        assert!(source.is_ranked());
    }
}
