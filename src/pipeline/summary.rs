use std::fmt;
use std::path::PathBuf;

use crate::chapters::{OutputChapterMarker, Timestamp};
use crate::engine::EngineStep;
use crate::error::Warning;
use crate::strategy::ExtractionMode;

/// What a run did (or, for a dry run, would do)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub dry_run: bool,
    pub mode: ExtractionMode,
    /// Encoder label when accurate or reencode mode used one
    pub encoder: Option<String>,
    pub source_duration: Timestamp,
    pub output_duration: Timestamp,
    pub segments_total: usize,
    pub segments_kept: usize,
    /// Files produced: one joined output, or one per segment in split mode
    pub outputs: Vec<PathBuf>,
    pub chapter_file: Option<PathBuf>,
    pub chapters: Vec<OutputChapterMarker>,
    pub warnings: Vec<Warning>,
    /// Every engine step, in order; the full plan for a dry run
    pub steps: Vec<EngineStep>,
    pub source_size: Option<u64>,
    pub output_size: Option<u64>,
}

impl RunSummary {
    pub fn segments_removed(&self) -> usize {
        self.segments_total - self.segments_kept
    }

    pub fn removed_ms(&self) -> u64 {
        self.source_duration.millis_since(self.output_duration).unwrap_or(0)
    }

    /// Percentage by which the output is smaller than the source
    pub fn size_reduction_percent(&self) -> Option<f64> {
        match (self.source_size, self.output_size) {
            (Some(source), Some(output)) if source > 0 => {
                Some((1.0 - output as f64 / source as f64) * 100.0)
            }
            _ => None,
        }
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Dry run: {} steps planned, nothing was executed", self.steps.len())?;
            for (n, step) in self.steps.iter().enumerate() {
                writeln!(f, "  {:>3}. {}", n + 1, step)?;
            }
        }

        match &self.encoder {
            Some(encoder) => writeln!(f, "Mode: {} ({})", self.mode, encoder)?,
            None => writeln!(f, "Mode: {}", self.mode)?,
        }
        writeln!(
            f,
            "Segments: {} kept, {} removed of {}",
            self.segments_kept,
            self.segments_removed(),
            self.segments_total
        )?;
        writeln!(
            f,
            "Duration: {} -> {} ({} removed)",
            self.source_duration,
            self.output_duration,
            Timestamp::from_millis(self.removed_ms())
        )?;

        for output in &self.outputs {
            writeln!(f, "Output: {}", output.display())?;
        }
        if let Some(path) = &self.chapter_file {
            writeln!(f, "Chapters: {} ({} markers)", path.display(), self.chapters.len())?;
        }

        if let (Some(source), Some(output), Some(percent)) =
            (self.source_size, self.output_size, self.size_reduction_percent())
        {
            writeln!(
                f,
                "Size: {:.1} MB -> {:.1} MB ({:.1}% smaller)",
                megabytes(source),
                megabytes(output),
                percent
            )?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "Warnings ({}):", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  - {}", warning)?;
            }
        }
        Ok(())
    }
}
