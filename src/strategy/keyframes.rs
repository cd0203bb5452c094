use crate::chapters::Timestamp;

/// Sorted, de-duplicated keyframe offsets of the source's first video stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyframeIndex {
    offsets: Vec<Timestamp>,
}

impl KeyframeIndex {
    pub fn new(mut offsets: Vec<Timestamp>) -> Self {
        offsets.sort_unstable();
        offsets.dedup();
        Self { offsets }
    }

    pub fn from_millis<I: IntoIterator<Item = u64>>(offsets: I) -> Self {
        Self::new(offsets.into_iter().map(Timestamp::from_millis).collect())
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.offsets.binary_search(&at).is_ok()
    }

    /// Last keyframe at or before `at`
    pub fn at_or_before(&self, at: Timestamp) -> Option<Timestamp> {
        let idx = self.offsets.partition_point(|&k| k <= at);
        idx.checked_sub(1).map(|i| self.offsets[i])
    }

    /// First keyframe at or after `at`
    pub fn at_or_after(&self, at: Timestamp) -> Option<Timestamp> {
        let idx = self.offsets.partition_point(|&k| k < at);
        self.offsets.get(idx).copied()
    }

    /// First keyframe strictly after `at`
    pub fn after(&self, at: Timestamp) -> Option<Timestamp> {
        let idx = self.offsets.partition_point(|&k| k <= at);
        self.offsets.get(idx).copied()
    }

    /// Average distance between keyframes, if there are at least two
    pub fn average_gop_ms(&self) -> Option<u64> {
        let (first, last) = (self.offsets.first()?, self.offsets.last()?);
        let spans = self.offsets.len().checked_sub(1).filter(|&n| n > 0)?;
        Some(last.millis_since(*first).unwrap_or(0) / spans as u64)
    }
}

/// A requested cut point and where stream copy can actually cut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnappedPoint {
    pub requested: Timestamp,
    pub snapped: Timestamp,
}

impl SnappedPoint {
    pub fn drift_ms(&self) -> u64 {
        self.requested.abs_diff(self.snapped)
    }
}

/// Snap a segment start back to the keyframe at or before it.
///
/// Without a usable keyframe the requested point is kept as-is.
pub fn snap_start(keyframes: &KeyframeIndex, start: Timestamp) -> SnappedPoint {
    SnappedPoint {
        requested: start,
        snapped: keyframes.at_or_before(start).unwrap_or(start),
    }
}

/// Snap a segment end forward to the keyframe at or after it, never past `limit`
pub fn snap_end(keyframes: &KeyframeIndex, end: Timestamp, limit: Timestamp) -> SnappedPoint {
    let snapped = keyframes
        .at_or_after(end)
        .filter(|&k| k <= limit)
        .unwrap_or(if end >= limit { limit } else { end });
    SnappedPoint {
        requested: end,
        snapped,
    }
}
