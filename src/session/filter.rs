use regex::{Regex, RegexBuilder};

use crate::config::{FilterConfig, FilterMode};

/// A compiled filter. A note matches when every pattern matches its
/// searchable text.
#[derive(Debug, Clone)]
pub struct FilterPattern {
    text: String,
    patterns: Vec<Regex>,
}

impl FilterPattern {
    /// `None` for an empty filter, which matches everything.
    pub fn compile(text: &str, config: &FilterConfig) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        let sources: Vec<String> = match config.mode {
            FilterMode::Regex => {
                let probe = RegexBuilder::new(text).case_insensitive(config.ignore_case).build();
                match probe {
                    Ok(regex) => {
                        return Some(Self {
                            text: text.to_string(),
                            patterns: vec![regex],
                        })
                    }
                    Err(e) => {
                        log::warn!("[Filter] Invalid regex {:?} ({}), matching literally", text, e);
                        vec![regex::escape(text)]
                    }
                }
            }
            FilterMode::Literal => vec![regex::escape(text)],
            FilterMode::Words => text.split_whitespace().map(regex::escape).collect(),
        };
        if sources.is_empty() {
            return None;
        }

        Some(Self {
            text: text.to_string(),
            patterns: build_all(&sources, config.ignore_case, SIZE_LIMIT),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// A filter whose patterns failed to build matches nothing.
    pub fn is_match(&self, haystack: &str) -> bool {
        !self.patterns.is_empty() && self.patterns.iter().all(|p| p.is_match(haystack))
    }
}

/// Compiled program size cap, the regex crate's own default.
const SIZE_LIMIT: usize = 10 * (1 << 20);

/// Every one of `sources`, or none if any fails to build.
fn build_all(sources: &[String], ignore_case: bool, size_limit: usize) -> Vec<Regex> {
    let mut patterns = Vec::with_capacity(sources.len());
    for source in sources {
        match RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .size_limit(size_limit)
            .build()
        {
            Ok(regex) => patterns.push(regex),
            Err(e) => {
                log::warn!("[Filter] Cannot build filter term {:?} ({}), nothing will match", source, e);
                return Vec::new();
            }
        }
    }
    patterns
}
