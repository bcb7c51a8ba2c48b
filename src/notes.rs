//! Creating, renaming, deleting and archiving note files.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{NotesError, Result};
use crate::session::{ChangeScope, Session};

/// Suffix of the temporary file written before an atomic rename.
pub const TMP_SUFFIX: &str = ".notedeck-tmp";

/// Derives a file name (without extension) from a note title.
pub trait NotenameStrategy {
    fn title_to_notename(&self, title: &str) -> Option<String>;
}

/// Lowercase, with every run of non-alphanumeric characters turned into `-`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlugNotename;

impl NotenameStrategy for SlugNotename {
    fn title_to_notename(&self, title: &str) -> Option<String> {
        let mut slug = String::with_capacity(title.len());
        for c in title.chars() {
            if c.is_alphanumeric() {
                slug.extend(c.to_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_end_matches('-');
        (!slug.is_empty()).then(|| slug.to_string())
    }
}

/// Write to a temp file in the same directory, then rename over `path`,
/// so watchers never see a half-written note.
pub fn atomic_write_file(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!("{}{}", file_name, TMP_SUFFIX));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// `target` if free, else the first free `stem-2.ext`, `stem-3.ext`, ...
pub fn resolve_collision(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }
    let stem = target
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let ext = target.extension().map(|e| e.to_string_lossy().to_string());
    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let mut counter = 2;
    loop {
        let new_name = match &ext {
            Some(e) => format!("{}-{}.{}", stem, counter, e),
            None => format!("{}-{}", stem, counter),
        };
        let candidate = parent.join(&new_name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

impl Session {
    /// Create a note in `root` (default: the first directory) and add it to
    /// `AllFiles`. The name comes from the notename strategy, or a timestamp
    /// when there is no usable title.
    pub fn new_note(&mut self, title: Option<&str>, root: Option<&Path>) -> Result<PathBuf> {
        let root = match root {
            Some(root) => self
                .directories
                .iter()
                .find(|d| d.as_path() == root)
                .cloned()
                .ok_or_else(|| NotesError::UnknownDirectory(root.to_path_buf()))?,
            None => self.directories.first().cloned().ok_or(NotesError::NoDirectories)?,
        };

        let title = title.map(str::trim).filter(|t| !t.is_empty());
        let stem = match title.and_then(|t| self.notename.title_to_notename(t)) {
            Some(name) => name,
            None => self.timestamp_name(),
        };
        let extension = &self.config.extensions.primary;
        let path = resolve_collision(&root.join(format!("{}.{}", stem, extension)));

        let content = match title {
            Some(t) if extension == "org" => format!("#+TITLE: {}\n\n", t),
            Some(t) => format!("{}\n\n", t),
            None => String::new(),
        };
        atomic_write_file(&path, content.as_bytes())?;
        log::info!("[Notes] Created {:?}", path);

        self.filesystem_changed(ChangeScope::Files, &[path.clone()]);
        Ok(path)
    }

    /// Rename a note within its directory. `new_name` without a note
    /// extension gets the primary one.
    pub fn rename_note(&mut self, path: &Path, new_name: &str) -> Result<PathBuf> {
        self.require_note(path)?;
        let new_name = new_name.trim();
        if new_name.is_empty() || Path::new(new_name).file_name() != Some(OsStr::new(new_name)) {
            return Err(NotesError::InvalidName(new_name.to_string()));
        }

        let file_name = if self.config.extensions.matches(new_name) {
            new_name.to_string()
        } else {
            format!("{}.{}", new_name, self.config.extensions.primary)
        };
        let target = path.with_file_name(file_name);
        if target.exists() {
            return Err(NotesError::NoteExists(target));
        }

        fs::rename(path, &target)?;
        log::info!("[Notes] Renamed {:?} -> {:?}", path, target);
        self.filesystem_changed(ChangeScope::Files, &[path.to_path_buf(), target.clone()]);
        Ok(target)
    }

    pub fn delete_note(&mut self, path: &Path) -> Result<()> {
        self.require_note(path)?;
        fs::remove_file(path)?;
        log::info!("[Notes] Deleted {:?}", path);
        self.filesystem_changed(ChangeScope::Files, &[path.to_path_buf()]);
        Ok(())
    }

    /// Move a note into its root's archive directory.
    pub fn archive_note(&mut self, path: &Path) -> Result<PathBuf> {
        let root = self.require_note(path)?;
        let archive = root.join(&self.config.archive_directory);
        fs::create_dir_all(&archive)?;

        let file_name = path.file_name().unwrap_or_default();
        let target = resolve_collision(&archive.join(file_name));
        fs::rename(path, &target)?;
        log::info!("[Notes] Archived {:?} -> {:?}", path, target);
        self.filesystem_changed(ChangeScope::Files, &[path.to_path_buf()]);
        Ok(target)
    }

    /// The root holding `path`, which must be an existing note.
    fn require_note(&self, path: &Path) -> Result<PathBuf> {
        match self.scanner.root_for(&self.directories, path) {
            Some(root) if path.is_file() => Ok(root.clone()),
            _ => Err(NotesError::NotANote(path.to_path_buf())),
        }
    }

    fn timestamp_name(&self) -> String {
        let now = chrono::Local::now();
        let mut name = String::new();
        if write!(name, "{}", now.format(&self.config.new_note.timestamp_format)).is_err() {
            log::warn!(
                "[Notes] Invalid timestamp format {:?}, using default",
                self.config.new_note.timestamp_format
            );
            name.clear();
            let _ = write!(name, "{}", now.format("%Y%m%dT%H%M%S"));
        }
        name
    }
}
