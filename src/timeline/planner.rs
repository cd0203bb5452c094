use tracing::{debug, info};

use crate::chapters::{ChapterMarker, Timestamp};
use crate::error::TimelineError;

/// A contiguous range `[start, end)` of the source bounded by two consecutive markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start: Timestamp,
    pub end: Timestamp,
    pub excluded: bool,
    /// Display title of the marker this segment starts at
    pub title: String,
}

impl Segment {
    pub fn duration_ms(&self) -> u64 {
        self.end.millis_since(self.start).unwrap_or(0)
    }

    pub fn is_kept(&self) -> bool {
        !self.excluded
    }
}

/// The ordered keep/drop segments for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    segments: Vec<Segment>,
    total: Timestamp,
}

impl Timeline {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn total(&self) -> Timestamp {
        self.total
    }

    /// Content before the first marker, which no segment covers
    pub fn leading_gap_ms(&self) -> u64 {
        self.segments
            .first()
            .map(|s| s.start.as_millis())
            .unwrap_or(0)
    }

    /// Kept segments paired with their index in the full sequence
    pub fn kept(&self) -> impl Iterator<Item = (usize, &Segment)> {
        self.segments.iter().enumerate().filter(|(_, s)| s.is_kept())
    }

    pub fn kept_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_kept()).count()
    }

    pub fn kept_duration_ms(&self) -> u64 {
        self.kept().map(|(_, s)| s.duration_ms()).sum()
    }
}

/// Convert markers plus the probed source duration into segments.
///
/// Segment `i` spans `[marker[i], marker[i+1])`; the last segment ends at `total`.
pub fn plan_segments(markers: &[ChapterMarker], total: Timestamp) -> Result<Timeline, TimelineError> {
    let Some(last) = markers.last() else {
        return Ok(Timeline {
            segments: Vec::new(),
            total,
        });
    };

    if total <= last.offset() {
        return Err(TimelineError::Range {
            last_marker: last.offset(),
            total,
        });
    }

    let segments = markers
        .iter()
        .enumerate()
        .map(|(index, marker)| {
            let end = markers.get(index + 1).map_or(total, |next| next.offset());
            let segment = Segment {
                start: marker.offset(),
                end,
                excluded: marker.excluded(),
                title: marker.title().to_string(),
            };
            if segment.end <= segment.start {
                return Err(TimelineError::DegenerateSegment {
                    index,
                    start: segment.start,
                    end: segment.end,
                });
            }
            Ok(segment)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let timeline = Timeline { segments, total };

    if timeline.leading_gap_ms() > 0 {
        info!(
            "Content before the first marker ({}) is not part of any segment and will be dropped",
            Timestamp::from_millis(timeline.leading_gap_ms())
        );
    }

    for (i, seg) in timeline.segments().iter().enumerate() {
        debug!(
            "  Segment {}: [{}, {}) {} '{}'",
            i,
            seg.start,
            seg.end,
            if seg.excluded { "drop" } else { "keep" },
            seg.title
        );
    }

    Ok(timeline)
}
