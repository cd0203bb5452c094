//! # Pipeline
//!
//! Wires the chapter, timeline and strategy stages to a [`MediaEngine`]
//! and owns everything with side effects: the scratch directory,
//! concurrent extraction, cancellation and the final report.
//!
//! [`MediaEngine`]: crate::engine::MediaEngine

pub mod cancel;
pub mod orchestrator;
pub mod summary;
pub mod trimmer;
pub mod workdir;

pub use cancel::CancellationToken;
pub use orchestrator::{Orchestrator, PlannedExtraction, RunPlan};
pub use summary::RunSummary;
pub use trimmer::{
    chapter_file_path, default_output_path, sanitize_title, split_file_name, SplitOptions, TrimRequest, Trimmer,
    DEFAULT_SPLIT_PATTERN,
};
pub use workdir::{artifact_path, WorkDir};
