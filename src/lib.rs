//! Note collection browsing engine: resolves note directories, keeps a
//! metadata cache of titles and summaries fresh by modification time, and
//! maintains the filtered, newest-first note list a view displays.

pub mod cache;
pub mod config;
pub mod error;
pub mod notes;
pub mod parser;
pub mod resolver;
pub mod scan;
pub mod search;
pub mod session;
pub mod view;


pub use cache::{CacheEntry, MetadataCache, RefreshOutcome};
pub use config::{Extensions, FilterConfig, FilterMode, NotesConfig, PathSpec};
pub use error::{NotesError, Result};
pub use notes::{NotenameStrategy, SlugNotename};
pub use search::index::TantivyIndex;
pub use search::watcher::{FsChange, NotesWatcher};
pub use search::{CandidateSource, FilesystemSource, IndexedSource, SearchIndexAdapter};
pub use session::pending::{PendingState, PendingUpdate};
pub use session::{ChangeScope, Session};
pub use view::{Listing, ListingState, NoteRow, Renderer, TextRenderer};
