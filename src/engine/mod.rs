//! # Media Engine
//!
//! The trimmer never touches media bytes itself. Everything that reads or
//! writes audio/video goes through a [`MediaEngine`], which is split into two
//! halves:
//!
//! - **planning** (`extraction_steps`, `concat_steps`) is synchronous and
//!   pure: it turns a job into the exact list of [`EngineStep`]s that would
//!   run, which is also what a dry run reports;
//! - **execution** (`execute`) runs one step against the real tool.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::chapters::Timestamp;
use crate::error::EngineError;
use crate::strategy::{ExtractionDirective, HardwareProfile, KeyframeIndex};

pub mod ffmpeg;

pub use ffmpeg::FfmpegEngine;

/// Stream properties that influence encoder parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Video bitrate in bits/s
    pub video_bitrate: Option<u64>,
    /// Frame rate as reported by the prober, e.g. `30000/1001`
    pub frame_rate: Option<String>,
    pub audio_codec: Option<String>,
    /// Audio bitrate in bits/s
    pub audio_bitrate: Option<u64>,
}

/// Everything the planner and strategy selector need to know about a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaProbe {
    pub duration: Timestamp,
    pub keyframes: KeyframeIndex,
    pub streams: StreamSummary,
}

/// One invocation of an external tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Short human-readable purpose, used in logs
    pub description: String,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// A single side effect the engine performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStep {
    Run(EngineCommand),
    /// Write an auxiliary file, e.g. a concat list
    WriteFile { path: PathBuf, contents: String },
}

impl fmt::Display for EngineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(command) => write!(f, "{}", command),
            Self::WriteFile { path, contents } => write!(
                f,
                "write {} ({} lines)",
                path.display(),
                contents.lines().count()
            ),
        }
    }
}

/// Extraction of one kept segment into one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    /// Position of this segment in the output
    pub position: usize,
    pub directive: ExtractionDirective,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Where the job may place its own intermediate files
    pub scratch_dir: PathBuf,
}

/// Adapter over an external media toolchain
pub trait MediaEngine: Send + Sync + 'static {
    /// Verify the toolchain can be executed at all
    fn check_available(&self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Read duration, keyframe offsets and stream properties of `source`
    fn probe(&self, source: &Path) -> impl Future<Output = Result<MediaProbe, EngineError>> + Send;

    /// Whether a hardware encoder actually works on this host
    fn encoder_available(&self, profile: HardwareProfile) -> impl Future<Output = bool> + Send;

    /// Steps that produce `job.destination` from the source
    fn extraction_steps(&self, job: &ExtractionJob) -> Vec<EngineStep>;

    /// Steps that join `artifacts`, in order, into `output` without re-encoding
    fn concat_steps(&self, artifacts: &[PathBuf], output: &Path, scratch_dir: &Path) -> Vec<EngineStep>;

    /// Perform one step
    fn execute(&self, step: &EngineStep) -> impl Future<Output = Result<(), EngineError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display_quotes_when_needed() {
        let command = EngineCommand::new("ffmpeg", "copy")
            .args(["-ss", "00:01:00.000", "-i"])
            .path_arg(Path::new("/tmp/my video.mp4"));
        assert_eq!(
            command.to_string(),
            "ffmpeg -ss 00:01:00.000 -i '/tmp/my video.mp4'"
        );
    }

    #[test]
    fn test_write_step_display() {
        let step = EngineStep::WriteFile {
            path: PathBuf::from("/tmp/list.txt"),
            contents: "file 'a'\nfile 'b'\n".to_string(),
        };
        assert_eq!(step.to_string(), "write /tmp/list.txt (2 lines)");
    }
}
