use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{NotesError, Result};

/// Thunk evaluated when directories are resolved. It must produce a string
/// or a sequence of strings; anything else is a configuration error.
pub type DeferredPath = Arc<dyn Fn() -> serde_yaml::Value + Send + Sync>;

/// One entry of the configured directory list.
#[derive(Clone, Deserialize)]
#[serde(from = "RawPathSpec")]
pub enum PathSpec {
    Literal(String),
    /// Environment variable read at resolution time. May hold a path list.
    Env(String),
    Deferred(DeferredPath),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPathSpec {
    Literal(String),
    Env { env: String },
}

impl From<RawPathSpec> for PathSpec {
    fn from(raw: RawPathSpec) -> Self {
        match raw {
            RawPathSpec::Literal(s) => PathSpec::Literal(s),
            RawPathSpec::Env { env } => PathSpec::Env(env),
        }
    }
}

impl PathSpec {
    pub fn literal(path: impl Into<String>) -> Self {
        PathSpec::Literal(path.into())
    }

    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn() -> serde_yaml::Value + Send + Sync + 'static,
    {
        PathSpec::Deferred(Arc::new(f))
    }
}

impl fmt::Debug for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            PathSpec::Env(name) => f.debug_tuple("Env").field(name).finish(),
            PathSpec::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for PathSpec {
    fn from(s: &str) -> Self {
        PathSpec::Literal(s.to_string())
    }
}

impl From<&Path> for PathSpec {
    fn from(p: &Path) -> Self {
        PathSpec::Literal(p.to_string_lossy().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Extensions {
    pub primary: String,
    pub secondary: Vec<String>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            primary: "org".to_string(),
            secondary: vec!["md".to_string(), "txt".to_string()],
        }
    }
}

impl Extensions {
    pub fn new(primary: &str, secondary: &[&str]) -> Self {
        Self {
            primary: primary.to_string(),
            secondary: secondary.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.secondary.iter().map(String::as_str))
    }

    /// Whether a file name carries one of the configured extensions.
    /// Compound extensions such as `org.gpg` are matched as suffixes.
    pub fn matches(&self, file_name: &str) -> bool {
        self.all().any(|ext| {
            let ext = ext.trim_start_matches('.');
            !ext.is_empty()
                && file_name.len() > ext.len() + 1
                && file_name.ends_with(ext)
                && file_name[..file_name.len() - ext.len()].ends_with('.')
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Regex,
    Literal,
    Words,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    pub ignore_case: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Treat a leading markdown heading as a title instead of a comment line.
    pub heading_titles: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub enabled: bool,
    /// On-disk index location. The index lives in memory when unset.
    pub path: Option<PathBuf>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewNoteConfig {
    /// chrono format used for the file name of untitled notes
    pub timestamp_format: String,
}

impl Default for NewNoteConfig {
    fn default() -> Self {
        Self {
            timestamp_format: "%Y%m%dT%H%M%S".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub directories: Vec<PathSpec>,
    pub extensions: Extensions,
    pub filter: FilterConfig,
    pub parse: ParseConfig,
    pub index: IndexConfig,
    pub archive_directory: String,
    pub new_note: NewNoteConfig,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            extensions: Extensions::default(),
            filter: FilterConfig::default(),
            parse: ParseConfig::default(),
            index: IndexConfig::default(),
            archive_directory: "_archive".to_string(),
            new_note: NewNoteConfig::default(),
        }
    }
}

impl NotesConfig {
    pub fn with_directories<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathSpec>,
    {
        Self {
            directories: dirs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| NotesError::ConfigFile(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| NotesError::ConfigFile(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_yaml(&content)?;
        log::info!(
            "[Config] Loaded {} with {} directory entries",
            path.display(),
            config.directories.len()
        );
        Ok(config)
    }
}
