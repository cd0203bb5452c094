use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::chapters::Timestamp;

/// Main error type for the chapter trimmer
#[derive(Error, Debug)]
pub enum TrimmerError {
    #[error("Chapter file error: {0}")]
    Chapter(#[from] ChapterError),

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Media engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Output already exists: {path}")]
    OutputExists { path: PathBuf },

    #[error("Chapter output would replace the input chapter list: {path}")]
    ChapterFileIsInput { path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chapter list malformation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChapterError {
    #[error("line {line}: {reason}: '{content}'")]
    Format {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("line {line}: timestamp {current} is not after the previous marker at {previous}")]
    Order {
        line: usize,
        previous: Timestamp,
        current: Timestamp,
    },

    #[error("no chapter markers found in {source_name}")]
    Empty { source_name: String },
}

/// Inconsistency between the chapter list and the source, or between segments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    #[error("last marker at {last_marker} is at or beyond the end of the source ({total})")]
    Range {
        last_marker: Timestamp,
        total: Timestamp,
    },

    #[error("segment {index} has no content: [{start}, {end})")]
    DegenerateSegment {
        index: usize,
        start: Timestamp,
        end: Timestamp,
    },

    #[error("kept segment {index} carries an excluded title '{title}'")]
    Consistency { index: usize, title: String },

    #[error("every segment is excluded, nothing would be kept")]
    NothingKept,
}

/// Extraction strategy selection failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("unsupported processing mode '{value}' (expected copy, accurate or reencode)")]
    UnsupportedMode { value: String },

    #[error("unknown encoder profile '{value}' (expected auto, none, videotoolbox, nvenc, qsv or amf)")]
    UnknownEncoderProfile { value: String },

    #[error("{mode} mode needs an encoder profile")]
    MissingEncoder { mode: String },
}

/// Failures reported by the external media engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{program} is not available: {reason}")]
    ToolNotFound { program: String, reason: String },

    #[error("failed to probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("extraction of segment {segment} failed: {reason}")]
    Extraction { segment: usize, reason: String },

    #[error("concatenation failed: {reason}")]
    Concat { reason: String },

    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using TrimmerError
pub type Result<T> = std::result::Result<T, TrimmerError>;

impl TrimmerError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Cancelled => 130,
            _ => 1,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Chapter(ChapterError::Format { line, content, reason }) => format!(
                "Chapter file line {}: {} in '{}'. Expected 'H:MM:SS.mmm Title' (e.g. 0:00:05.151 Opening).",
                line, reason, content
            ),
            Self::Chapter(ChapterError::Order { line, previous, current }) => format!(
                "Chapter file line {}: {} must be later than the previous marker {}. Markers must be strictly increasing.",
                line, current, previous
            ),
            Self::Timeline(TimelineError::Range { last_marker, total }) => format!(
                "The last chapter marker ({}) is not before the end of the video ({}). Check that the chapter file belongs to this video.",
                last_marker, total
            ),
            Self::Engine(EngineError::ToolNotFound { program, .. }) => format!(
                "'{}' could not be executed. Install FFmpeg (https://ffmpeg.org/download.html) and make sure it is on your PATH.",
                program
            ),
            Self::OutputExists { path } => format!(
                "Output file '{}' already exists. Pass --overwrite to replace it.",
                path.display()
            ),
            Self::ChapterFileIsInput { path } => format!(
                "The chapter list for the output would be written to '{}', which is the input chapter file. \
                 Choose a different output name or pass --no-chapters.",
                path.display()
            ),
            _ => self.to_string(),
        }
    }
}

/// Which end of a segment a boundary refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::End => f.write_str("end"),
        }
    }
}

/// Recoverable conditions. Logged when raised and listed in the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A copy-mode cut point moved further than the configured tolerance
    KeyframeDrift {
        segment: usize,
        boundary: Boundary,
        requested: Timestamp,
        snapped: Timestamp,
        drift_ms: u64,
    },

    /// The requested encoder could not be used; software encoding took its place
    EncoderFallback { requested: String, used: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyframeDrift {
                segment,
                boundary,
                requested,
                snapped,
                drift_ms,
            } => write!(
                f,
                "segment {} {} {} snapped to keyframe {} ({} ms drift); use --mode accurate for exact cuts",
                segment, boundary, requested, snapped, drift_ms
            ),
            Self::EncoderFallback { requested, used } => write!(
                f,
                "encoder '{}' is not available, falling back to {}",
                requested, used
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(TrimmerError::Cancelled.exit_code(), 130);
        let err: TrimmerError = ChapterError::Empty {
            source_name: "chapters.txt".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_user_message_names_offending_line() {
        let err: TrimmerError = ChapterError::Format {
            line: 3,
            content: "0:00:05.15 X".to_string(),
            reason: "invalid timestamp".to_string(),
        }
        .into();
        let message = err.user_message();
        assert!(message.contains("line 3"));
        assert!(message.contains("0:00:05.15 X"));
    }

    #[test]
    fn test_drift_warning_display() {
        let warning = Warning::KeyframeDrift {
            segment: 2,
            boundary: Boundary::Start,
            requested: Timestamp::from_millis(58_000),
            snapped: Timestamp::from_millis(50_000),
            drift_ms: 8_000,
        };
        let text = warning.to_string();
        assert!(text.contains("segment 2 start"));
        assert!(text.contains("8000 ms"));
    }
}
