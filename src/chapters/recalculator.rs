use std::fmt::Write as _;
use std::path::Path;

use tracing::debug;

use crate::chapters::Timestamp;
use crate::error::{Result, TimelineError};
use crate::timeline::Segment;

/// A chapter entry positioned on the edited timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChapterMarker {
    pub offset: Timestamp,
    pub title: String,
}

/// Produces the chapter list of the edited video.
///
/// Each kept segment yields one marker whose offset is the summed duration of
/// the kept segments before it. Dropped segments contribute nothing.
#[derive(Debug, Clone)]
pub struct ChapterRecalculator {
    exclude_prefix: String,
}

impl ChapterRecalculator {
    pub fn new<S: Into<String>>(exclude_prefix: S) -> Self {
        Self {
            exclude_prefix: exclude_prefix.into(),
        }
    }

    pub fn recalculate(&self, segments: &[Segment]) -> std::result::Result<Vec<OutputChapterMarker>, TimelineError> {
        let mut running_ms = 0u64;
        let mut chapters = Vec::new();

        for (index, segment) in segments.iter().enumerate() {
            if segment.excluded {
                continue;
            }

            if !self.exclude_prefix.is_empty() && segment.title.trim_start().starts_with(&self.exclude_prefix) {
                return Err(TimelineError::Consistency {
                    index,
                    title: segment.title.clone(),
                });
            }

            chapters.push(OutputChapterMarker {
                offset: Timestamp::from_millis(running_ms),
                title: segment.title.clone(),
            });
            running_ms += segment.duration_ms();
        }

        debug!(
            "Recalculated {} chapters, edited duration {}",
            chapters.len(),
            Timestamp::from_millis(running_ms)
        );

        Ok(chapters)
    }
}

/// Render chapters in the chapter file format, one `H:MM:SS.mmm title` per line
pub fn render_chapters(chapters: &[OutputChapterMarker]) -> String {
    let mut out = String::new();
    for chapter in chapters {
        // Writing to a String cannot fail
        let _ = writeln!(out, "{} {}", chapter.offset, chapter.title);
    }
    out
}

pub async fn write_chapter_file(chapters: &[OutputChapterMarker], path: &Path) -> Result<()> {
    tokio::fs::write(path, render_chapters(chapters)).await?;
    Ok(())
}
