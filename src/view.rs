use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

/// Which display path the view should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingState {
    NoDirectories,
    /// Directories exist but hold no notes.
    NoNotes,
    /// Notes exist but the filter rejects all of them.
    NoMatches,
    Notes,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteRow<'a> {
    pub path: &'a Path,
    pub title: Option<&'a str>,
    pub summary: Option<String>,
    pub modified: Option<DateTime<Local>>,
}

impl NoteRow<'_> {
    /// The title, or the file stem for untitled notes.
    pub fn display_title(&self) -> String {
        match self.title {
            Some(title) => title.to_string(),
            None => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing<'a> {
    pub state: ListingState,
    pub filter: Option<&'a str>,
    pub query: Option<&'a str>,
    /// Size of `AllFiles`, before filtering.
    pub total: usize,
    pub notes: Vec<NoteRow<'a>>,
}

pub trait Renderer {
    fn render(&mut self, listing: &Listing<'_>) -> io::Result<()>;
}

const TITLE_WIDTH: usize = 40;
const SUMMARY_WIDTH: usize = 60;

/// Plain text or JSON output on any writer.
pub struct TextRenderer<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, json: false }
    }

    pub fn json(out: W) -> Self {
        Self { out, json: true }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render_text(&mut self, listing: &Listing<'_>) -> io::Result<()> {
        match listing.state {
            ListingState::NoDirectories => {
                return writeln!(self.out, "No note directories found. Check the configured directories.")
            }
            ListingState::NoNotes => return writeln!(self.out, "No notes yet."),
            ListingState::NoMatches => {
                return writeln!(
                    self.out,
                    "No notes match {:?} ({} notes total).",
                    listing.filter.unwrap_or_default(),
                    listing.total
                )
            }
            ListingState::Notes => {}
        }

        for row in &listing.notes {
            let date = row
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            writeln!(
                self.out,
                "{:<tw$}  {:<sw$}  {}",
                truncate(&row.display_title(), TITLE_WIDTH),
                truncate(row.summary.as_deref().unwrap_or_default(), SUMMARY_WIDTH),
                date,
                tw = TITLE_WIDTH,
                sw = SUMMARY_WIDTH,
            )?;
        }
        Ok(())
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn render(&mut self, listing: &Listing<'_>) -> io::Result<()> {
        if self.json {
            serde_json::to_writer_pretty(&mut self.out, listing)?;
            writeln!(self.out)?;
        } else {
            self.render_text(listing)?;
        }
        self.out.flush()
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
