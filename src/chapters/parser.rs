use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::chapters::Timestamp;
use crate::error::ChapterError;

/// Default title prefix marking a segment for removal
pub const DEFAULT_EXCLUDE_PREFIX: &str = "--";

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+:\d{2}:\d{2}\.\d{3})\s+(.*)$").expect("chapter line pattern is valid")
    })
}

/// A single timestamped, titled entry of a chapter list.
///
/// The exclusion flag is computed once from the raw title; `title` holds the
/// display title with the exclusion prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterMarker {
    offset: Timestamp,
    title: String,
    excluded: bool,
}

impl ChapterMarker {
    /// Build a marker from a raw title, deriving the exclusion flag from `exclude_prefix`
    pub fn new(offset: Timestamp, raw_title: &str, exclude_prefix: &str) -> Self {
        let trimmed = raw_title.trim();
        match trimmed.strip_prefix(exclude_prefix) {
            Some(rest) if !exclude_prefix.is_empty() => Self {
                offset,
                title: rest.trim_start().to_string(),
                excluded: true,
            },
            _ => Self {
                offset,
                title: trimmed.to_string(),
                excluded: false,
            },
        }
    }

    pub fn offset(&self) -> Timestamp {
        self.offset
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn excluded(&self) -> bool {
        self.excluded
    }
}

/// Parses chapter list text into an ordered, validated marker sequence
#[derive(Debug, Clone)]
pub struct ChapterParser {
    exclude_prefix: String,
}

impl Default for ChapterParser {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDE_PREFIX)
    }
}

impl ChapterParser {
    pub fn new<S: Into<String>>(exclude_prefix: S) -> Self {
        Self {
            exclude_prefix: exclude_prefix.into(),
        }
    }

    pub fn exclude_prefix(&self) -> &str {
        &self.exclude_prefix
    }

    /// Parse chapter text.
    ///
    /// Blank lines are skipped; line numbers in errors are 1-based physical
    /// line numbers. `source_name` only labels the [`ChapterError::Empty`] error.
    pub fn parse(&self, text: &str, source_name: &str) -> Result<Vec<ChapterMarker>, ChapterError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut markers: Vec<ChapterMarker> = Vec::new();

        for (index, raw_line) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            let (offset, title) = self.parse_line(line, line_number)?;

            if let Some(previous) = markers.last() {
                if offset <= previous.offset() {
                    return Err(ChapterError::Order {
                        line: line_number,
                        previous: previous.offset(),
                        current: offset,
                    });
                }
            }

            markers.push(ChapterMarker::new(offset, title, &self.exclude_prefix));
        }

        if markers.is_empty() {
            return Err(ChapterError::Empty {
                source_name: source_name.to_string(),
            });
        }

        debug!(
            "Parsed {} markers ({} excluded) from {}",
            markers.len(),
            markers.iter().filter(|m| m.excluded()).count(),
            source_name
        );

        Ok(markers)
    }

    fn parse_line<'a>(&self, line: &'a str, line_number: usize) -> Result<(Timestamp, &'a str), ChapterError> {
        let format_error = |reason: String| ChapterError::Format {
            line: line_number,
            content: line.to_string(),
            reason,
        };

        let Some(captures) = line_pattern().captures(line) else {
            // Re-parse the leading token to say what exactly is wrong with it
            let token = line.split_whitespace().next().unwrap_or_default();
            let reason = match token.parse::<Timestamp>() {
                Err(e) => format!("invalid timestamp ({})", e),
                Ok(_) => "missing title after timestamp".to_string(),
            };
            return Err(format_error(reason));
        };

        let (Some(stamp), Some(title)) = (captures.get(1), captures.get(2)) else {
            return Err(format_error("unrecognized line".to_string()));
        };

        let offset = stamp
            .as_str()
            .parse::<Timestamp>()
            .map_err(|e| format_error(format!("invalid timestamp ({})", e)))?;

        Ok((offset, title.as_str()))
    }
}
