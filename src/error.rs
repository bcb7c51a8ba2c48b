use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum NotesError {
    /// A directory specification evaluated to something other than a path or list of paths.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load config file: {0}")]
    ConfigFile(String),

    /// The file vanished or became unreadable between the existence check and the read.
    #[error("Failed to read {path}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Search index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    #[error("No existing note directories")]
    NoDirectories,

    #[error("Note already exists: {0}")]
    NoteExists(PathBuf),

    #[error("Not a note under any configured directory: {0}")]
    NotANote(PathBuf),

    #[error("Not one of the note directories: {0}")]
    UnknownDirectory(PathBuf),

    #[error("Invalid note name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NotesError>;

impl From<tantivy::TantivyError> for NotesError {
    fn from(err: tantivy::TantivyError) -> Self {
        NotesError::IndexUnavailable(err.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for NotesError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        NotesError::InvalidQuery(err.to_string())
    }
}
