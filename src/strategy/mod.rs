//! # Extraction Strategy
//!
//! Decides, per kept segment, whether it is stream-copied with keyframe-snapped
//! cuts, re-encoded only around its boundaries, or re-encoded in full, and
//! which encoder does the re-encoding.
//!
//! ## Modes
//!
//! - **copy**: fastest, cut points move to keyframes (drift beyond the
//!   tolerance is reported, never fatal)
//! - **accurate**: partial GOPs at each boundary are re-encoded, the rest copied
//! - **reencode**: every kept segment re-encoded, frame exact

pub mod encoder;
pub mod keyframes;
pub mod selector;

pub use encoder::{
    probe_candidates, resolve_encoder, EncoderProfile, EncoderResolution, GpuPreference, HardwareProfile, Platform,
};
pub use keyframes::{snap_end, snap_start, KeyframeIndex, SnappedPoint};
pub use selector::{
    split_at_keyframes, ExtractionDirective, ExtractionMode, ExtractionPlan, PartMethod, StrategySelector, SubRange,
};
