pub mod filter;
pub mod pending;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::cache::{CacheEntry, MetadataCache, RefreshOutcome};
use crate::config::NotesConfig;
use crate::error::Result;
use crate::notes::{NotenameStrategy, SlugNotename};
use crate::resolver;
use crate::scan::Scanner;
use crate::search::watcher::FsChange;
use crate::search::{self, CandidateSource};
use crate::view::{Listing, ListingState, NoteRow, Renderer};

use filter::FilterPattern;
use pending::{PendingState, PendingUpdate};

/// How much of the tree a filesystem change may have touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    /// Only the given note files.
    Files,
    /// Directory structure under the given directories, or under every root
    /// when none are given.
    Dirs,
    Anything,
}

/// The browsing state for one set of note directories: the metadata cache,
/// `AllFiles`, `CurrentFiles` and the update owed to the view.
///
/// All mutation goes through `&mut self`; watchers and other threads hand
/// their changes to the owning loop instead of touching the session.
pub struct Session {
    pub(crate) config: NotesConfig,
    pub(crate) scanner: Scanner,
    source: Box<dyn CandidateSource>,
    pub(crate) notename: Box<dyn NotenameStrategy>,
    pub(crate) directories: Vec<PathBuf>,
    cache: MetadataCache,
    all_files: Arc<Vec<PathBuf>>,
    current_files: Arc<Vec<PathBuf>>,
    filter: Option<FilterPattern>,
    filter_text: Option<String>,
    query: Option<String>,
    pending: PendingState,
}

impl Session {
    /// Session with the candidate source `config` asks for, fully loaded.
    pub fn from_config(config: NotesConfig) -> Result<Self> {
        let source = search::source_from_config(&config)?;
        Self::new(config, source)
    }

    /// Resolve the directories and load `AllFiles` from `source`.
    pub fn new(config: NotesConfig, source: Box<dyn CandidateSource>) -> Result<Self> {
        let mut session = Self {
            scanner: Scanner::new(config.extensions.clone()),
            cache: MetadataCache::new(config.parse.clone()),
            config,
            source,
            notename: Box::new(SlugNotename),
            directories: Vec::new(),
            all_files: Arc::new(Vec::new()),
            current_files: Arc::new(Vec::new()),
            filter: None,
            filter_text: None,
            query: None,
            pending: PendingState::new(),
        };
        session.reset()?;
        Ok(session)
    }

    pub fn with_notename(mut self, strategy: Box<dyn NotenameStrategy>) -> Self {
        self.notename = strategy;
        self
    }

    /// Re-resolve the configured directories, drop every cache entry and
    /// reload from scratch. A configuration error leaves the session as it was.
    pub fn reset(&mut self) -> Result<()> {
        let directories = resolver::resolve_existing(&self.config.directories)?;
        log::info!("[Session] Using {} note directories", directories.len());
        self.directories = directories;
        self.cache.clear();
        self.filesystem_changed(ChangeScope::Anything, &[]);
        Ok(())
    }

    /// Full re-source of `AllFiles`.
    pub fn refresh(&mut self) {
        self.filesystem_changed(ChangeScope::Anything, &[]);
    }

    pub fn config(&self) -> &NotesConfig {
        &self.config
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn all_files(&self) -> &[PathBuf] {
        &self.all_files
    }

    pub fn current_files(&self) -> &[PathBuf] {
        &self.current_files
    }

    /// Whether `CurrentFiles` is `AllFiles` itself rather than a filtered copy.
    pub fn current_is_all(&self) -> bool {
        Arc::ptr_eq(&self.all_files, &self.current_files)
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter_text.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn pending(&self) -> PendingUpdate {
        self.pending.level()
    }

    pub fn entry(&self, path: &Path) -> Option<&CacheEntry> {
        self.cache.lookup(path)
    }

    pub fn title(&self, path: &Path) -> Option<&str> {
        self.cache.lookup(path)?.title.as_deref()
    }

    /// Summary with whitespace collapsed, as displayed.
    pub fn summary(&self, path: &Path) -> Option<String> {
        self.cache.lookup(path)?.display_summary()
    }

    pub fn mtime(&self, path: &Path) -> Option<SystemTime> {
        self.cache.lookup(path).map(|e| e.mtime)
    }

    /// Apply a batch from the filesystem watcher.
    pub fn apply_change(&mut self, change: FsChange) {
        match change {
            FsChange::Files(paths) => self.filesystem_changed(ChangeScope::Files, &paths),
            FsChange::Dirs(paths) => self.filesystem_changed(ChangeScope::Dirs, &paths),
        }
    }

    /// Bring `AllFiles` and the cache up to date after a change on disk.
    ///
    /// With the filesystem source and `Files` scope only `targets` are
    /// refreshed and `AllFiles` is patched in place; everything else
    /// re-sources the list. Read and index failures are logged and absorbed.
    pub fn filesystem_changed(&mut self, scope: ChangeScope, targets: &[PathBuf]) {
        match scope {
            ChangeScope::Files if !targets.is_empty() => {
                if self.source.is_ranked() {
                    let roots: Vec<PathBuf> = self
                        .directories
                        .iter()
                        .filter(|root| targets.iter().any(|t| t.starts_with(root)))
                        .cloned()
                        .collect();
                    self.resource_all(Some(roots.as_slice()));
                } else {
                    self.update_files(targets);
                }
            }
            ChangeScope::Dirs if !targets.is_empty() => {
                let within: Vec<PathBuf> = targets
                    .iter()
                    .filter(|t| self.directories.iter().any(|root| t.starts_with(root)))
                    .cloned()
                    .collect();
                let reindex = if within.is_empty() {
                    self.directories.clone()
                } else {
                    within
                };
                self.resource_all(Some(reindex.as_slice()));
            }
            _ => {
                let all = self.directories.clone();
                self.resource_all(Some(all.as_slice()));
            }
        }
    }

    /// Change the search query. Without a search index there is nothing to
    /// narrow, so the query is only remembered.
    pub fn query_changed(&mut self, query: Option<&str>) {
        let query = query.map(str::trim).filter(|q| !q.is_empty()).map(str::to_string);
        if query == self.query {
            return;
        }
        self.query = query;
        if !self.source.is_ranked() {
            log::debug!("[Session] No search index configured, query ignored");
            return;
        }
        self.resource_all(None);
    }

    /// Change the live filter. Takes effect on the next observable flush.
    pub fn filter_changed(&mut self, filter: Option<&str>) {
        let text = filter.filter(|f| !f.is_empty()).map(str::to_string);
        self.filter = text
            .as_deref()
            .and_then(|t| FilterPattern::compile(t, &self.config.filter));
        self.filter_text = text;
        self.pending.escalate(PendingUpdate::Recompute);
    }

    pub fn escalate(&mut self, level: PendingUpdate) {
        self.pending.escalate(level);
    }

    /// Perform the owed work if the view is visible: recompute
    /// `CurrentFiles` when needed, then render. Returns the level handled,
    /// `Idle` when nothing was done. A failed render stays pending.
    pub fn flush_if_observable(&mut self, visible: bool, renderer: &mut dyn Renderer) -> Result<PendingUpdate> {
        let Some(level) = self.pending.due(visible) else {
            return Ok(PendingUpdate::Idle);
        };
        if level == PendingUpdate::Recompute {
            self.recompute_current();
        }
        renderer.render(&self.listing())?;
        self.pending.settle();
        Ok(level)
    }

    /// The view's input: state, rows for `CurrentFiles` that still exist.
    pub fn listing(&self) -> Listing<'_> {
        let notes: Vec<NoteRow<'_>> = self
            .current_files
            .iter()
            .filter(|path| path.is_file())
            .map(|path| {
                let entry = self.cache.lookup(path);
                NoteRow {
                    path,
                    title: entry.and_then(|e| e.title.as_deref()),
                    summary: entry.and_then(CacheEntry::display_summary),
                    modified: entry.map(|e| DateTime::<Local>::from(e.mtime)),
                }
            })
            .collect();

        let state = if self.directories.is_empty() {
            ListingState::NoDirectories
        } else if self.all_files.is_empty() {
            ListingState::NoNotes
        } else if notes.is_empty() && self.filter.is_some() {
            ListingState::NoMatches
        } else if notes.is_empty() {
            ListingState::NoNotes
        } else {
            ListingState::Notes
        };

        Listing {
            state,
            filter: self.filter_text.as_deref(),
            query: self.query.as_deref(),
            total: self.all_files.len(),
            notes,
        }
    }

    /// Evict cache entries for deleted files and return their paths.
    pub fn collect_garbage(&mut self) -> Vec<PathBuf> {
        self.cache.invalidate_missing()
    }

    pub(crate) fn recompute_current(&mut self) {
        self.current_files = match &self.filter {
            None => Arc::clone(&self.all_files),
            Some(pattern) => Arc::new(
                self.all_files
                    .iter()
                    .filter(|path| {
                        self.cache
                            .lookup(path)
                            .map_or(false, |entry| pattern.is_match(&entry.searchable_text))
                    })
                    .cloned()
                    .collect(),
            ),
        };
        log::debug!(
            "[Session] {} of {} notes shown",
            self.current_files.len(),
            self.all_files.len()
        );
    }

    /// Replace `AllFiles` with a fresh list from the candidate source,
    /// reindexing `reindex` first. On source failure the old list stays.
    fn resource_all(&mut self, reindex: Option<&[PathBuf]>) {
        self.pending.escalate(PendingUpdate::Recompute);
        if self.directories.is_empty() {
            self.set_all_files(Vec::new());
            return;
        }

        if let Some(dirs) = reindex.filter(|d| !d.is_empty()) {
            if let Err(e) = self.source.reindex(dirs) {
                log::warn!("[Session] Reindex failed: {}", e);
            }
        }
        let sourced = match self.source.source_files(&self.directories, self.query.as_deref()) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("[Session] {}; keeping the previous note list", e);
                return;
            }
        };

        let files = self.admit(sourced);
        log::info!("[Session] Loaded {} notes", files.len());
        self.set_all_files(files);
    }

    /// Refresh the cache for `sourced` and keep the files that exist and
    /// could be read, sorted newest first unless the source ranks them.
    fn admit(&mut self, sourced: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let sourced: Vec<PathBuf> = sourced.into_iter().filter(|p| seen.insert(p.clone())).collect();

        let outcomes = self.cache.refresh_all(&sourced);
        let mut files = Vec::with_capacity(sourced.len());
        for (path, outcome) in sourced.into_iter().zip(outcomes) {
            match outcome {
                Ok(RefreshOutcome::Missing) => {}
                Ok(_) => files.push(path),
                Err(e) => log::warn!("[Session] {}; skipped for this refresh", e),
            }
        }
        if !self.source.is_ranked() {
            self.sort_newest_first(&mut files);
        }
        files
    }

    /// Patch `AllFiles` for a few known paths instead of rescanning.
    fn update_files(&mut self, targets: &[PathBuf]) {
        let mut files: Vec<PathBuf> = self.all_files.as_ref().clone();
        let mut seen = HashSet::new();

        for target in targets.iter().filter(|t| seen.insert(*t)) {
            let admissible = match self.cache.refresh(target) {
                Ok(RefreshOutcome::Missing) => false,
                Ok(_) => self.scanner.root_for(&self.directories, target).is_some(),
                Err(e) => {
                    log::warn!("[Session] {}; skipped for this refresh", e);
                    false
                }
            };
            let position = files.iter().position(|p| p == target);
            match (admissible, position) {
                (true, None) => files.push(target.clone()),
                (false, Some(index)) => {
                    files.remove(index);
                }
                _ => {}
            }
        }

        // A changed mtime can move a file anywhere in the order.
        self.sort_newest_first(&mut files);
        log::debug!("[Session] Updated {} changed files", seen.len());
        self.set_all_files(files);
        self.pending.escalate(PendingUpdate::Recompute);
    }

    /// Unfiltered, `CurrentFiles` is `AllFiles` itself and follows it at
    /// once; a filtered list waits for the next observable flush.
    fn set_all_files(&mut self, files: Vec<PathBuf>) {
        self.all_files = Arc::new(files);
        if self.filter.is_none() {
            self.current_files = Arc::clone(&self.all_files);
        }
    }

    fn sort_newest_first(&self, files: &mut [PathBuf]) {
        files.sort_by_key(|path| std::cmp::Reverse(self.cache.lookup(path).map(|e| e.mtime)));
    }
}
