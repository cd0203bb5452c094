//! # Timeline Planning
//!
//! Turns a validated marker list and the probed source duration into the
//! ordered sequence of keep/drop segments the rest of the pipeline works from.

pub mod planner;

pub use planner::{plan_segments, Segment, Timeline};
