//! # Chapter Trimmer
//!
//! Remove unwanted chapters from a video without re-encoding what stays.
//!
//! A chapter list marks the segments to drop with a `--` title prefix. The
//! library plans keep/drop segments against the probed source, extracts the
//! kept ones through ffmpeg (stream copy, boundary-only re-encode, or full
//! re-encode), joins them, and rewrites the chapter list for the shorter video.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chapter_trimmer::{Config, FfmpegEngine, TrimRequest, Trimmer};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let engine = FfmpegEngine::new(config.engine.clone());
//! let trimmer = Trimmer::new(config, engine);
//!
//! let summary = trimmer
//!     .run(&TrimRequest::new("chapters.txt", "recording.mp4"))
//!     .await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`chapters`] - chapter file parsing, timestamps, recalculated output
//! - [`timeline`] - keep/drop segment planning
//! - [`strategy`] - keyframe snapping, encoder selection, per-segment directives
//! - [`engine`] - the media engine contract and its ffmpeg implementation
//! - [`pipeline`] - orchestration, scratch space, cancellation, run summary
//! - [`config`] - configuration management
//!
//! ## Chapter format
//!
//! ```text
//! 0:00:05.151 Opening
//! 0:01:05.822 --CM
//! 0:02:36.160 Main Content
//! ```

pub mod chapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod strategy;
pub mod timeline;

// Re-export commonly used types for convenience
pub use crate::{
    chapters::{ChapterParser, Timestamp},
    config::Config,
    engine::{FfmpegEngine, MediaEngine},
    error::{Result, TrimmerError, Warning},
    pipeline::{CancellationToken, RunSummary, SplitOptions, TrimRequest, Trimmer},
    strategy::{ExtractionMode, GpuPreference},
};
