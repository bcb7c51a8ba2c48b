use notify::event::{CreateKind, RemoveKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{NotesError, Result};
use crate::notes::TMP_SUFFIX;
use crate::scan::{is_hidden_name, Scanner};

/// A debounced batch of filesystem changes under the note directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    /// Individual note files changed, appeared or disappeared.
    Files(Vec<PathBuf>),
    /// Directory structure changed; these subtrees need a full rescan.
    Dirs(Vec<PathBuf>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    File,
    Dir,
}

/// More stable files than this in one batch are reported as a rescan of
/// their roots instead.
const BURST_THRESHOLD: usize = 200;

/// Collects raw events and releases them once they stop changing.
struct Debouncer {
    roots: Vec<PathBuf>,
    scanner: Scanner,
    pending: HashMap<PathBuf, (PendingKind, Instant)>,
}

impl Debouncer {
    fn new(roots: Vec<PathBuf>, scanner: Scanner) -> Self {
        Self {
            roots,
            scanner,
            pending: HashMap::new(),
        }
    }

    fn record(&mut self, event: &Event, now: Instant) {
        for path in &event.paths {
            if let Some(kind) = self.classify(path, &event.kind) {
                self.pending.insert(path.clone(), (kind, now));
            }
        }
    }

    fn classify(&self, path: &Path, kind: &EventKind) -> Option<PendingKind> {
        let file_name = path.file_name()?.to_string_lossy();
        // Skip temporary files from atomic writes
        if file_name.ends_with(TMP_SUFFIX) {
            return None;
        }
        let root = self.roots.iter().find(|root| path.starts_with(root))?;
        if self.scanner.is_note_path(root, path) {
            return Some(PendingKind::File);
        }

        let relative = path.strip_prefix(root).ok()?;
        let hidden = relative.components().any(|c| match c {
            Component::Normal(name) => is_hidden_name(&name.to_string_lossy()),
            _ => true,
        });
        if hidden {
            return None;
        }
        let is_dir = path.is_dir()
            || matches!(kind, EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder))
            || (!path.exists() && path.extension().is_none());
        is_dir.then_some(PendingKind::Dir)
    }

    /// Drain everything that has been quiet for at least `debounce`.
    fn take_stable(&mut self, now: Instant, debounce: Duration) -> Vec<FsChange> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        self.pending.retain(|path, (kind, last_event)| {
            if now.duration_since(*last_event) < debounce {
                return true;
            }
            match kind {
                PendingKind::File => files.push(path.clone()),
                PendingKind::Dir => dirs.push(path.clone()),
            }
            false
        });

        if files.len() > BURST_THRESHOLD {
            log::info!(
                "[Watcher] Burst of {} file changes, rescanning affected roots",
                files.len()
            );
            for file in files.drain(..) {
                if let Some(root) = self.roots.iter().find(|root| file.starts_with(root)) {
                    dirs.push(root.clone());
                }
            }
        }

        let mut changes = Vec::new();
        if !dirs.is_empty() {
            dirs.sort();
            dirs.dedup();
            changes.push(FsChange::Dirs(dirs));
        }
        if !files.is_empty() {
            files.sort();
            changes.push(FsChange::Files(files));
        }
        changes
    }
}

pub struct NotesWatcher {
    _watcher: RecommendedWatcher,
}

impl NotesWatcher {
    /// Watch `roots` recursively and send debounced batches to `sink`.
    /// The background thread stops when the watcher or the receiver is dropped.
    pub fn start(roots: &[PathBuf], scanner: Scanner, sink: mpsc::Sender<FsChange>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            tx,
            Config::default().with_poll_interval(Duration::from_millis(300)),
        )
        .map_err(|e| NotesError::Configuration(format!("Failed to start file watcher: {}", e)))?;

        for root in roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| NotesError::Configuration(format!("Failed to watch {}: {}", root.display(), e)))?;
        }
        log::info!("[Watcher] Watching {} directories", roots.len());

        let mut debouncer = Debouncer::new(roots.to_vec(), scanner);
        thread::spawn(move || {
            let poll = Duration::from_millis(250);
            let debounce = Duration::from_millis(500);
            let mut last_check = Instant::now();
            loop {
                match rx.recv_timeout(poll) {
                    Ok(Ok(event)) => debouncer.record(&event, Instant::now()),
                    Ok(Err(e)) => {
                        log::warn!("[Watcher] File watcher error: {}", e);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }

                // Steady event traffic must not starve the flush.
                if last_check.elapsed() < poll {
                    continue;
                }
                last_check = Instant::now();
                for change in debouncer.take_stable(last_check, debounce) {
                    log::debug!("[Watcher] {:?}", change);
                    if sink.send(change).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(NotesWatcher { _watcher: watcher })
    }
}
