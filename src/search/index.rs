use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, Query, QueryParser};
use tantivy::schema::*;
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument};

use super::SearchIndexAdapter;
use crate::cache::disk_mtime;
use crate::config::ParseConfig;
use crate::error::{NotesError, Result};
use crate::parser::parse_with;
use crate::scan::Scanner;

/// Bump when the schema below changes; older on-disk indexes are rebuilt.
const SCHEMA_VERSION: u32 = 1;

const METADATA_FILE: &str = "notedeck_meta.json";
const WRITER_MEMORY: usize = 50_000_000;

#[derive(Serialize, Deserialize, Clone)]
struct IndexMetadata {
    app_version: String,
    schema_version: u32,
    created_at: String,
}

impl IndexMetadata {
    fn new() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: SCHEMA_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

/// Pre-parsed document data for batch indexing
struct ParsedDocument {
    path: PathBuf,
    title: String,
    body: String,
    mtime: i64,
}

struct Fields {
    path: Field,
    title: Field,
    body: Field,
    mtime: Field,
}

/// Full-text index over note files, kept current by mtime comparison.
pub struct TantivyIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    fields: Fields,
    scanner: Scanner,
    parse: ParseConfig,
    max_results: Option<usize>,
    /// Indexed mtime (ms since epoch) per file.
    file_cache: HashMap<PathBuf, i64>,
    needs_reload: bool,
    #[cfg(test)]
    fail_next_commit: bool,
}

impl TantivyIndex {
    pub fn in_memory(scanner: Scanner, parse: ParseConfig) -> Result<Self> {
        let (schema, fields) = Self::build_schema();
        let index = Index::create_in_ram(schema);
        log::info!("[TantivyIndex] Using in-memory index");
        Self::from_index(index, fields, scanner, parse)
    }

    /// Open or create an index stored in `index_dir`. Incompatible or
    /// unreadable indexes are deleted and rebuilt from scratch.
    pub fn open(index_dir: &Path, scanner: Scanner, parse: ParseConfig) -> Result<Self> {
        log::info!("[TantivyIndex] Using index directory {:?}", index_dir);
        if Self::needs_regeneration(index_dir) {
            Self::delete_index(index_dir)?;
        }

        match Self::open_dir(index_dir) {
            Ok((index, fields)) => Self::from_index(index, fields, scanner, parse),
            Err(e) => {
                log::warn!("[TantivyIndex] Failed to open index ({}), recreating", e);
                Self::delete_index(index_dir)?;
                let (index, fields) = Self::open_dir(index_dir)?;
                Self::from_index(index, fields, scanner, parse)
            }
        }
    }

    pub fn with_max_results(mut self, max_results: Option<usize>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn build_schema() -> (Schema, Fields) {
        let mut builder = Schema::builder();
        let fields = Fields {
            path: builder.add_text_field("path", STRING | STORED),
            title: builder.add_text_field("title", TEXT | STORED),
            body: builder.add_text_field("body", TEXT),
            mtime: builder.add_i64_field("mtime", INDEXED | STORED),
        };
        (builder.build(), fields)
    }

    fn open_dir(index_dir: &Path) -> Result<(Index, Fields)> {
        fs::create_dir_all(index_dir)?;
        Self::cleanup_stale_locks(index_dir);

        let (schema, fields) = Self::build_schema();
        let directory = MmapDirectory::open(index_dir)
            .map_err(|e| NotesError::IndexUnavailable(e.to_string()))?;
        let index = Index::open_or_create(directory, schema)?;
        if Self::read_metadata(index_dir).is_none() {
            Self::write_metadata(index_dir, &IndexMetadata::new())?;
        }
        Ok((index, fields))
    }

    fn from_index(index: Index, fields: Fields, scanner: Scanner, parse: ParseConfig) -> Result<Self> {
        let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        let mut this = Self {
            index,
            reader,
            writer,
            fields,
            scanner,
            parse,
            max_results: None,
            file_cache: HashMap::new(),
            needs_reload: false,
            #[cfg(test)]
            fail_next_commit: false,
        };
        this.load_file_cache()?;
        Ok(this)
    }

    /// Seed the mtime cache from stored documents so a reopened index only
    /// re-parses what changed while it was closed.
    fn load_file_cache(&mut self) -> Result<()> {
        let searcher = self.reader.searcher();
        for address in Self::all_addresses(&searcher)? {
            if let Some((path, mtime)) = self.stored_fields(&searcher, address)? {
                self.file_cache.insert(path, mtime);
            }
        }
        if !self.file_cache.is_empty() {
            log::info!("[TantivyIndex] Reopened index with {} documents", self.file_cache.len());
        }
        Ok(())
    }

    fn read_metadata(index_dir: &Path) -> Option<IndexMetadata> {
        let content = fs::read_to_string(index_dir.join(METADATA_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_metadata(index_dir: &Path, metadata: &IndexMetadata) -> Result<()> {
        let content = serde_json::to_string_pretty(metadata)
            .map_err(|e| NotesError::IndexUnavailable(format!("Failed to serialize metadata: {}", e)))?;
        let mut file = fs::File::create(index_dir.join(METADATA_FILE))?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn needs_regeneration(index_dir: &Path) -> bool {
        if !index_dir.exists() {
            return false;
        }
        match Self::read_metadata(index_dir) {
            Some(metadata) if metadata.is_compatible() => false,
            Some(metadata) => {
                log::warn!(
                    "[TantivyIndex] Schema version mismatch: index={}, current={}. Regenerating...",
                    metadata.schema_version,
                    SCHEMA_VERSION
                );
                true
            }
            None => {
                // An empty directory is simply a fresh location.
                let occupied = fs::read_dir(index_dir).map(|mut d| d.next().is_some()).unwrap_or(false);
                if occupied {
                    log::warn!("[TantivyIndex] No metadata found (old/corrupted index). Regenerating...");
                }
                occupied
            }
        }
    }

    fn delete_index(index_dir: &Path) -> Result<()> {
        if index_dir.exists() {
            fs::remove_dir_all(index_dir)?;
        }
        Ok(())
    }

    /// A crashed process can leave the writer lock behind.
    fn cleanup_stale_locks(index_dir: &Path) {
        let Ok(entries) = fs::read_dir(index_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "lock") {
                log::warn!("[TantivyIndex] Removing stale lock file: {:?}", path);
                if let Err(e) = fs::remove_file(&path) {
                    log::error!("[TantivyIndex] Failed to remove lock file: {}", e);
                }
            }
        }
    }

    fn reload_if_needed(&mut self) -> Result<()> {
        if self.needs_reload {
            self.reader.reload()?;
            self.needs_reload = false;
        }
        Ok(())
    }

    fn parse_file_for_index(path: &Path, parse: &ParseConfig) -> Result<Option<ParsedDocument>> {
        let Some(modified) = disk_mtime(path)? else {
            return Ok(None);
        };
        let bytes = fs::read(path).map_err(|source| NotesError::ReadFailure {
            path: path.to_path_buf(),
            source,
        })?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        let title = parse_with(&body, parse).title.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });
        Ok(Some(ParsedDocument {
            path: path.to_path_buf(),
            title,
            body,
            mtime: millis(modified),
        }))
    }

    fn stage_and_commit(&mut self, removed: &[PathBuf], parsed: &[ParsedDocument]) -> Result<()> {
        for path in removed {
            let term = self.path_term(path);
            self.writer.delete_term(term);
        }
        for parsed_doc in parsed {
            let term = self.path_term(&parsed_doc.path);
            self.writer.delete_term(term);

            let mut doc = TantivyDocument::new();
            doc.add_text(self.fields.path, parsed_doc.path.to_string_lossy());
            doc.add_text(self.fields.title, &parsed_doc.title);
            doc.add_text(self.fields.body, &parsed_doc.body);
            doc.add_i64(self.fields.mtime, parsed_doc.mtime);
            self.writer.add_document(doc)?;
        }
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_commit) {
            return Err(NotesError::IndexUnavailable("commit failed".to_string()));
        }
        self.writer.commit()?;
        Ok(())
    }

    fn path_term(&self, path: &Path) -> Term {
        Term::from_field_text(self.fields.path, &path.to_string_lossy())
    }

    fn all_addresses(searcher: &Searcher) -> Result<Vec<DocAddress>> {
        let total = searcher.num_docs() as usize;
        if total == 0 {
            return Ok(Vec::new());
        }
        let hits = searcher.search(&AllQuery, &TopDocs::with_limit(total))?;
        Ok(hits.into_iter().map(|(_, address)| address).collect())
    }

    fn stored_fields(&self, searcher: &Searcher, address: DocAddress) -> Result<Option<(PathBuf, i64)>> {
        let doc: TantivyDocument = searcher.doc(address)?;
        let path = doc.get_first(self.fields.path).and_then(|v| v.as_str());
        let mtime = doc.get_first(self.fields.mtime).and_then(|v| v.as_i64());
        Ok(path.map(|p| (PathBuf::from(p), mtime.unwrap_or(0))))
    }

    fn collect_hits(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        dirs: &[PathBuf],
    ) -> Result<Vec<(PathBuf, i64)>> {
        let total = searcher.num_docs() as usize;
        if total == 0 {
            return Ok(Vec::new());
        }
        // Scored order; directory filtering happens after retrieval.
        let hits = searcher.search(query, &TopDocs::with_limit(total))?;
        let mut files = Vec::with_capacity(hits.len());
        for (_score, address) in hits {
            if let Some((path, mtime)) = self.stored_fields(searcher, address)? {
                if dirs.iter().any(|d| path.starts_with(d)) {
                    files.push((path, mtime));
                }
            }
        }
        Ok(files)
    }
}

impl SearchIndexAdapter for TantivyIndex {
    fn index_directories(&mut self, dirs: &[PathBuf]) -> Result<()> {
        let mut current: Vec<PathBuf> = dirs
            .iter()
            .flat_map(|dir| self.scanner.enumerate_absolute(dir))
            .collect();
        current.sort();
        current.dedup();

        let cache = &self.file_cache;
        let changed: Vec<&PathBuf> = current
            .par_iter()
            .filter(|path| match disk_mtime(path) {
                Ok(Some(modified)) => cache
                    .get(*path)
                    .map_or(true, |cached| millis(modified) > *cached),
                _ => false,
            })
            .collect();

        let parse = &self.parse;
        let parsed: Vec<ParsedDocument> = changed
            .par_iter()
            .filter_map(|path| match Self::parse_file_for_index(path, parse) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("[TantivyIndex] Skipping {}", e);
                    None
                }
            })
            .collect();

        let present: HashSet<&PathBuf> = current.iter().collect();
        let removed: Vec<PathBuf> = self
            .file_cache
            .keys()
            .filter(|path| dirs.iter().any(|d| path.starts_with(d)) && !present.contains(path))
            .cloned()
            .collect();

        if parsed.is_empty() && removed.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.stage_and_commit(&removed, &parsed) {
            if let Err(rollback) = self.writer.rollback() {
                log::error!("[TantivyIndex] Rollback failed: {}", rollback);
            }
            return Err(e);
        }
        // Only committed changes count as indexed.
        for path in &removed {
            self.file_cache.remove(path);
        }
        for parsed_doc in &parsed {
            self.file_cache.insert(parsed_doc.path.clone(), parsed_doc.mtime);
        }
        self.needs_reload = true;

        log::info!(
            "[TantivyIndex] Indexed {} changed and removed {} files across {} directories",
            parsed.len(),
            removed.len(),
            dirs.len()
        );
        Ok(())
    }

    fn search(&mut self, dirs: &[PathBuf], query: Option<&str>) -> Result<Vec<PathBuf>> {
        self.reload_if_needed()?;
        let searcher = self.reader.searcher();

        let files = match query.map(str::trim).filter(|q| !q.is_empty()) {
            None => {
                let mut files = self.collect_hits(&searcher, &AllQuery, dirs)?;
                files.sort_by(|a, b| b.1.cmp(&a.1));
                files
            }
            Some(text) => {
                let parser = QueryParser::for_index(&self.index, vec![self.fields.title, self.fields.body]);
                let parsed = parser.parse_query(text)?;
                self.collect_hits(&searcher, &*parsed, dirs)?
            }
        };

        let limit = self.max_results.unwrap_or(usize::MAX);
        Ok(files.into_iter().take(limit).map(|(path, _)| path).collect())
    }
}

fn millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
