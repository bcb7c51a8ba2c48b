use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ParseConfig;

static TITLE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:#\+)?title:(.*)$").unwrap());

static KEYWORDS_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:#\+)?(?:keywords|filetags):(.*)$").unwrap());

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+(.*)$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedNote {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub keywords: Option<String>,
}

pub fn parse(content: &str) -> ParsedNote {
    parse_with(content, &ParseConfig::default())
}

/// Single pass over the lines of `content`.
///
/// Marker lines (`#+TITLE:`, `#+KEYWORDS:`, `#+FILETAGS:`) feed title and
/// keywords; other `#` lines are comments. The first visible line becomes the
/// title when none was set by a marker, and everything after it the summary;
/// when a marker already set the title, the summary starts at that line.
pub fn parse_with(content: &str, options: &ParseConfig) -> ParsedNote {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut title: Option<String> = None;
    let mut keywords: Vec<String> = Vec::new();
    let mut summary: Option<String> = None;
    let mut offset = 0;

    for raw_line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end_matches(['\n', '\r']);

        if let Some(caps) = TITLE_MARKER.captures(line) {
            if title.is_none() {
                title = non_blank(&caps[1]);
            }
            continue;
        }
        if let Some(caps) = KEYWORDS_MARKER.captures(line) {
            if let Some(words) = non_blank(&caps[1]) {
                keywords.push(words);
            }
            continue;
        }
        if options.heading_titles && title.is_none() {
            if let Some(caps) = HEADING.captures(line) {
                if let Some(heading) = non_blank(&caps[1]) {
                    title = Some(heading);
                    summary = non_blank(&content[offset..]);
                    break;
                }
            }
        }
        if line.trim_start().starts_with('#') || line.trim().is_empty() {
            continue;
        }

        if title.is_none() {
            title = non_blank(line);
            summary = non_blank(&content[offset..]);
        } else {
            summary = non_blank(&content[line_start..]);
        }
        break;
    }

    ParsedNote {
        title,
        summary,
        keywords: non_blank(&keywords.join(" ")),
    }
}

/// Summaries keep their line structure in the cache; display collapses it.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_title_and_rest_summary() {
        let parsed = parse("Hello\n\nWorld");
        assert_eq!(parsed.title.as_deref(), Some("Hello"));
        assert_eq!(parsed.summary.as_deref(), Some("World"));
        assert_eq!(parsed.keywords, None);
    }

    #[test]
    fn test_title_marker_then_body() {
        let parsed = parse("#+TITLE: Second\nBody text");
        assert_eq!(parsed.title.as_deref(), Some("Second"));
        assert_eq!(parsed.summary.as_deref(), Some("Body text"));
    }

    #[test]
    fn test_first_title_marker_wins() {
        let parsed = parse("#+title: One\n#+TITLE: Two\nbody");
        assert_eq!(parsed.title.as_deref(), Some("One"));
        assert_eq!(parsed.summary.as_deref(), Some("body"));
    }

    #[test]
    fn test_keywords_and_comments_excluded() {
        let content = "# a comment\n#+FILETAGS: :work:\n#+KEYWORDS: alpha beta\n\nTitle line\nfirst\nsecond\n";
        let parsed = parse(content);
        assert_eq!(parsed.title.as_deref(), Some("Title line"));
        assert_eq!(parsed.summary.as_deref(), Some("first\nsecond"));
        assert_eq!(parsed.keywords.as_deref(), Some(":work: alpha beta"));
    }

    #[test]
    fn test_markers_only_has_no_summary() {
        let parsed = parse("#+TITLE: Only markers\n# comment\n#+KEYWORDS: k\n");
        assert_eq!(parsed.title.as_deref(), Some("Only markers"));
        assert_eq!(parsed.summary, None);
        assert_eq!(parsed.keywords.as_deref(), Some("k"));
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(parse(""), ParsedNote::default());
        assert_eq!(parse("  \n\t\n"), ParsedNote::default());
    }

    #[test]
    fn test_blank_marker_does_not_claim_title() {
        let parsed = parse("#+TITLE:   \nReal title\nbody");
        assert_eq!(parsed.title.as_deref(), Some("Real title"));
        assert_eq!(parsed.summary.as_deref(), Some("body"));
    }

    #[test]
    fn test_title_without_summary() {
        let parsed = parse("   Just a title   \n\n   \n");
        assert_eq!(parsed.title.as_deref(), Some("Just a title"));
        assert_eq!(parsed.summary, None);
    }

    #[test]
    fn test_crlf_lines() {
        let parsed = parse("#+TITLE: Win\r\nBody\r\nmore\r\n");
        assert_eq!(parsed.title.as_deref(), Some("Win"));
        assert_eq!(parsed.summary.as_deref(), Some("Body\r\nmore"));
    }

    #[test]
    fn test_heading_titles_option() {
        let content = "# Heading\n\nparagraph";
        assert_eq!(parse(content).title.as_deref(), Some("paragraph"));

        let options = ParseConfig { heading_titles: true };
        let parsed = parse_with(content, &options);
        assert_eq!(parsed.title.as_deref(), Some("Heading"));
        assert_eq!(parsed.summary.as_deref(), Some("paragraph"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a\n\n  b\tc  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }
}
