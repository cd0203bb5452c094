//! # Chapter Lists
//!
//! Reading and writing the line-oriented chapter format:
//!
//! ```text
//! 0:00:05.151 Opening
//! 0:01:05.822 --CM
//! 0:02:36.160 Main Content
//! ```
//!
//! A title starting with the exclusion prefix (`--` by default) marks the
//! segment beginning at that marker for removal.

pub mod parser;
pub mod recalculator;
pub mod timestamp;

pub use parser::{ChapterMarker, ChapterParser, DEFAULT_EXCLUDE_PREFIX};
pub use recalculator::{render_chapters, write_chapter_file, ChapterRecalculator, OutputChapterMarker};
pub use timestamp::{Timestamp, TimestampParseError};
