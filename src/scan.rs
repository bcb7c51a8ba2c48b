use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::Extensions;

/// Entries starting with these are never descended into or listed.
/// Used to hide archive (`_archive`) and private subtrees, plus editor
/// lock/autosave files (`.#note.org`, `#note.org#`).
const HIDDEN_PREFIXES: [char; 3] = ['.', '_', '#'];

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with(HIDDEN_PREFIXES)
}

#[derive(Debug, Clone)]
pub struct Scanner {
    extensions: Extensions,
}

impl Scanner {
    pub fn new(extensions: Extensions) -> Self {
        Self { extensions }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Note files under `root`, relative to it. Missing or unreadable roots
    /// yield an empty set.
    pub fn enumerate(&self, root: &Path) -> HashSet<PathBuf> {
        self.walk(root)
            .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
            .collect()
    }

    /// Same as `enumerate`, with absolute paths.
    pub fn enumerate_absolute(&self, root: &Path) -> HashSet<PathBuf> {
        self.walk(root).map(|entry| entry.into_path()).collect()
    }

    fn walk<'a>(&'a self, root: &Path) -> impl Iterator<Item = DirEntry> + 'a {
        WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden_name(&entry.file_name().to_string_lossy()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::debug!("[Scanner] Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(move |entry| {
                entry.file_type().is_file()
                    && self.extensions.matches(&entry.file_name().to_string_lossy())
            })
    }

    /// Whether `path` is a file the enumerator would list under `root`:
    /// located inside `root`, outside any hidden subtree, with a note
    /// extension. Existence is not checked.
    pub fn is_note_path(&self, root: &Path, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        let mut names = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => names.push(name.to_string_lossy()),
                _ => return false,
            }
        }
        match names.last() {
            Some(file_name) => {
                self.extensions.matches(file_name) && !names.iter().any(|n| is_hidden_name(n))
            }
            None => false,
        }
    }

    /// The first of `roots` that contains `path` as a note.
    pub fn root_for<'r>(&self, roots: &'r [PathBuf], path: &Path) -> Option<&'r PathBuf> {
        roots.iter().find(|root| self.is_note_path(root, path))
    }
}
