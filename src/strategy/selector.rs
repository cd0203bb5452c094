use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::chapters::Timestamp;
use crate::error::{Boundary, StrategyError, Warning};
use crate::strategy::encoder::EncoderProfile;
use crate::strategy::keyframes::{snap_end, snap_start, KeyframeIndex, SnappedPoint};
use crate::timeline::{Segment, Timeline};

/// Global processing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// Container-level stream copy, cuts snapped to keyframes
    #[default]
    Copy,
    /// Re-encode only the partial GOPs at each boundary, copy the rest
    Accurate,
    /// Re-encode every kept segment in full
    Reencode,
}

impl ExtractionMode {
    pub fn needs_encoder(self) -> bool {
        !matches!(self, Self::Copy)
    }
}

impl FromStr for ExtractionMode {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" | "fast" => Ok(Self::Copy),
            "accurate" => Ok(Self::Accurate),
            "reencode" | "re-encode" => Ok(Self::Reencode),
            _ => Err(StrategyError::UnsupportedMode { value: s.to_string() }),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::Accurate => f.write_str("accurate"),
            Self::Reencode => f.write_str("reencode"),
        }
    }
}

/// How one sub-range of an accurate-mode segment is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartMethod {
    Encode,
    Copy,
}

/// A slice of a segment in accurate mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRange {
    pub start: Timestamp,
    pub end: Timestamp,
    pub method: PartMethod,
}

impl SubRange {
    pub fn duration_ms(&self) -> u64 {
        self.end.millis_since(self.start).unwrap_or(0)
    }
}

/// Mode-specific payload of a directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionPlan {
    Copy {
        start: SnappedPoint,
        end: SnappedPoint,
    },
    Accurate {
        parts: Vec<SubRange>,
        encoder: EncoderProfile,
    },
    Reencode {
        encoder: EncoderProfile,
    },
}

/// One extraction instruction for one kept segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionDirective {
    /// Index of the segment in the full timeline
    pub segment_index: usize,
    pub segment: Segment,
    pub plan: ExtractionPlan,
}

impl ExtractionDirective {
    pub fn mode(&self) -> ExtractionMode {
        match self.plan {
            ExtractionPlan::Copy { .. } => ExtractionMode::Copy,
            ExtractionPlan::Accurate { .. } => ExtractionMode::Accurate,
            ExtractionPlan::Reencode { .. } => ExtractionMode::Reencode,
        }
    }

    pub fn encoder(&self) -> Option<&EncoderProfile> {
        match &self.plan {
            ExtractionPlan::Copy { .. } => None,
            ExtractionPlan::Accurate { encoder, .. } | ExtractionPlan::Reencode { encoder } => Some(encoder),
        }
    }

    /// Source range the extraction actually reads
    pub fn effective_range(&self) -> (Timestamp, Timestamp) {
        match &self.plan {
            ExtractionPlan::Copy { start, end } => (start.snapped, end.snapped),
            _ => (self.segment.start, self.segment.end),
        }
    }

    /// True when the source range to read is empty
    pub fn is_empty(&self) -> bool {
        let (start, end) = self.effective_range();
        end <= start
    }
}

/// Run-wide handling, with the encoder the non-copy modes need
#[derive(Debug, Clone)]
enum Handling {
    Copy,
    Accurate(EncoderProfile),
    Reencode(EncoderProfile),
}

/// Chooses copy / accurate / reencode handling for each kept segment
#[derive(Debug, Clone)]
pub struct StrategySelector<'a> {
    handling: Handling,
    keyframes: &'a KeyframeIndex,
    drift_tolerance_ms: u64,
    source_end: Timestamp,
    shared_joins: bool,
}

impl<'a> StrategySelector<'a> {
    /// `encoder` is ignored in copy mode and required in the other modes.
    pub fn new(
        mode: ExtractionMode,
        encoder: Option<EncoderProfile>,
        keyframes: &'a KeyframeIndex,
        drift_tolerance_ms: u64,
        source_end: Timestamp,
    ) -> Result<Self, StrategyError> {
        let handling = match (mode, encoder) {
            (ExtractionMode::Copy, _) => Handling::Copy,
            (ExtractionMode::Accurate, Some(encoder)) => Handling::Accurate(encoder),
            (ExtractionMode::Reencode, Some(encoder)) => Handling::Reencode(encoder),
            (mode, None) => {
                return Err(StrategyError::MissingEncoder {
                    mode: mode.to_string(),
                })
            }
        };
        Ok(Self {
            handling,
            keyframes,
            drift_tolerance_ms,
            source_end,
            shared_joins: true,
        })
    }

    /// Whether adjacent kept segments are concatenated into one output.
    ///
    /// When they are, copy mode cuts both sides of their shared boundary at
    /// the same keyframe so the joined output neither repeats nor loses
    /// frames. Separate outputs snap every end forward instead.
    pub fn with_shared_joins(mut self, shared_joins: bool) -> Self {
        self.shared_joins = shared_joins;
        self
    }

    pub fn mode(&self) -> ExtractionMode {
        match self.handling {
            Handling::Copy => ExtractionMode::Copy,
            Handling::Accurate(_) => ExtractionMode::Accurate,
            Handling::Reencode(_) => ExtractionMode::Reencode,
        }
    }

    /// Directive for a segment whose end borders excluded content or the end of the source
    pub fn select(&self, segment_index: usize, segment: &Segment) -> (ExtractionDirective, Vec<Warning>) {
        self.select_segment(segment_index, segment, false)
    }

    fn select_segment(
        &self,
        segment_index: usize,
        segment: &Segment,
        joins_next: bool,
    ) -> (ExtractionDirective, Vec<Warning>) {
        let mut warnings = Vec::new();

        let plan = match &self.handling {
            Handling::Copy => {
                let start = snap_start(self.keyframes, segment.start);
                let end = if joins_next {
                    // The next segment starts at this same keyframe
                    SnappedPoint {
                        requested: segment.end,
                        snapped: snap_start(self.keyframes, segment.end).snapped,
                    }
                } else {
                    snap_end(self.keyframes, segment.end, self.source_end)
                };

                let mut boundaries = vec![(Boundary::Start, start)];
                if !joins_next {
                    boundaries.push((Boundary::End, end));
                }
                for (boundary, point) in boundaries {
                    if point.drift_ms() > self.drift_tolerance_ms {
                        let warning = Warning::KeyframeDrift {
                            segment: segment_index,
                            boundary,
                            requested: point.requested,
                            snapped: point.snapped,
                            drift_ms: point.drift_ms(),
                        };
                        warn!("{}", warning);
                        warnings.push(warning);
                    }
                }
                ExtractionPlan::Copy { start, end }
            }
            Handling::Accurate(encoder) => ExtractionPlan::Accurate {
                parts: split_at_keyframes(self.keyframes, segment.start, segment.end),
                encoder: encoder.clone(),
            },
            Handling::Reencode(encoder) => ExtractionPlan::Reencode {
                encoder: encoder.clone(),
            },
        };

        let directive = ExtractionDirective {
            segment_index,
            segment: segment.clone(),
            plan,
        };
        debug!(
            "Segment {} [{}, {}) -> {}",
            segment_index,
            segment.start,
            segment.end,
            directive.mode()
        );
        (directive, warnings)
    }

    /// Directives for every kept segment in chronological order.
    ///
    /// With shared joins, a copy-mode segment that starts and ends inside
    /// the same GOP has nothing left to extract: the next segment's cut
    /// already covers it, so no directive is produced for it.
    pub fn select_all(&self, timeline: &Timeline) -> (Vec<ExtractionDirective>, Vec<Warning>) {
        let segments = timeline.segments();
        let mut directives = Vec::with_capacity(timeline.kept_count());
        let mut warnings = Vec::new();
        for (index, segment) in timeline.kept() {
            let joins_next = self.shared_joins && segments.get(index + 1).is_some_and(Segment::is_kept);
            let (directive, mut raised) = self.select_segment(index, segment, joins_next);
            warnings.append(&mut raised);
            if directive.is_empty() {
                debug!("Segment {} falls inside one GOP, carried by segment {}", index, index + 1);
                continue;
            }
            directives.push(directive);
        }
        (directives, warnings)
    }
}

/// Split `[start, end)` into an encoded lead-in up to the first keyframe, a
/// stream-copied middle between keyframes, and an encoded trail-out from the
/// last keyframe. Parts that would be empty are omitted; with no keyframe
/// strictly inside the range the whole range is encoded.
pub fn split_at_keyframes(keyframes: &KeyframeIndex, start: Timestamp, end: Timestamp) -> Vec<SubRange> {
    let first_inside = if keyframes.contains(start) {
        Some(start)
    } else {
        keyframes.after(start).filter(|&k| k < end)
    };
    let last_inside = keyframes.at_or_before(end).filter(|&k| k >= start);

    let (Some(copy_from), Some(copy_to)) = (first_inside, last_inside) else {
        return vec![SubRange {
            start,
            end,
            method: PartMethod::Encode,
        }];
    };

    let mut parts = Vec::with_capacity(3);
    if copy_from > start {
        parts.push(SubRange {
            start,
            end: copy_from,
            method: PartMethod::Encode,
        });
    }
    if copy_to > copy_from {
        parts.push(SubRange {
            start: copy_from,
            end: copy_to,
            method: PartMethod::Copy,
        });
    }
    if end > copy_to {
        parts.push(SubRange {
            start: copy_to,
            end,
            method: PartMethod::Encode,
        });
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::ChapterMarker;
    use crate::config::EncoderConfig;
    use crate::engine::StreamSummary;
    use crate::timeline::plan_segments;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn segment(start: u64, end: u64) -> Segment {
        Segment {
            start: ts(start),
            end: ts(end),
            excluded: false,
            title: "S".to_string(),
        }
    }

    fn software() -> EncoderProfile {
        EncoderProfile::software(&EncoderConfig::default(), &StreamSummary::default())
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("copy".parse::<ExtractionMode>().unwrap(), ExtractionMode::Copy);
        assert_eq!("Accurate".parse::<ExtractionMode>().unwrap(), ExtractionMode::Accurate);
        assert_eq!("reencode".parse::<ExtractionMode>().unwrap(), ExtractionMode::Reencode);
        assert_eq!(
            "turbo".parse::<ExtractionMode>().unwrap_err(),
            StrategyError::UnsupportedMode {
                value: "turbo".to_string()
            }
        );
    }

    #[test]
    fn test_copy_mode_snaps_and_warns() {
        let keyframes = KeyframeIndex::from_millis([0, 50_000, 120_000]);
        let selector = StrategySelector::new(ExtractionMode::Copy, None, &keyframes, 100, ts(180_000)).unwrap();
        let (directive, warnings) = selector.select(2, &segment(58_000, 120_000));

        assert_eq!(directive.effective_range(), (ts(50_000), ts(120_000)));
        assert_eq!(
            warnings,
            vec![Warning::KeyframeDrift {
                segment: 2,
                boundary: Boundary::Start,
                requested: ts(58_000),
                snapped: ts(50_000),
                drift_ms: 8_000,
            }]
        );
        assert!(directive.encoder().is_none());
    }

    #[test]
    fn test_copy_mode_within_tolerance_is_silent() {
        let keyframes = KeyframeIndex::from_millis([0, 9_950, 20_000]);
        let selector = StrategySelector::new(ExtractionMode::Copy, Some(software()), &keyframes, 100, ts(30_000)).unwrap();
        let (directive, warnings) = selector.select(0, &segment(10_000, 20_000));
        assert!(warnings.is_empty());
        assert_eq!(directive.mode(), ExtractionMode::Copy);
        assert!(directive.encoder().is_none());
    }

    #[test]
    fn test_accurate_splits_into_three_parts() {
        let keyframes = KeyframeIndex::from_millis([0, 10_000, 20_000, 30_000, 40_000]);
        let parts = split_at_keyframes(&keyframes, ts(12_000), ts(35_000));
        assert_eq!(
            parts,
            vec![
                SubRange { start: ts(12_000), end: ts(20_000), method: PartMethod::Encode },
                SubRange { start: ts(20_000), end: ts(30_000), method: PartMethod::Copy },
                SubRange { start: ts(30_000), end: ts(35_000), method: PartMethod::Encode },
            ]
        );
        let total: u64 = parts.iter().map(SubRange::duration_ms).sum();
        assert_eq!(total, 23_000);
    }

    #[test]
    fn test_accurate_omits_parts_on_keyframe_boundaries() {
        let keyframes = KeyframeIndex::from_millis([0, 10_000, 20_000, 30_000]);
        let parts = split_at_keyframes(&keyframes, ts(10_000), ts(30_000));
        assert_eq!(
            parts,
            vec![SubRange { start: ts(10_000), end: ts(30_000), method: PartMethod::Copy }]
        );

        let parts = split_at_keyframes(&keyframes, ts(10_000), ts(25_000));
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].method, PartMethod::Copy);
        assert_eq!(parts[1], SubRange { start: ts(20_000), end: ts(25_000), method: PartMethod::Encode });
    }

    #[test]
    fn test_accurate_without_inner_keyframe_encodes_everything() {
        let keyframes = KeyframeIndex::from_millis([0, 60_000]);
        let parts = split_at_keyframes(&keyframes, ts(5_000), ts(50_000));
        assert_eq!(parts, vec![SubRange { start: ts(5_000), end: ts(50_000), method: PartMethod::Encode }]);

        let parts = split_at_keyframes(&KeyframeIndex::default(), ts(5_000), ts(50_000));
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_single_inner_keyframe_gives_lead_and_trail() {
        let keyframes = KeyframeIndex::from_millis([0, 20_000, 60_000]);
        let parts = split_at_keyframes(&keyframes, ts(15_000), ts(25_000));
        assert_eq!(
            parts,
            vec![
                SubRange { start: ts(15_000), end: ts(20_000), method: PartMethod::Encode },
                SubRange { start: ts(20_000), end: ts(25_000), method: PartMethod::Encode },
            ]
        );
    }

    #[test]
    fn test_reencode_keeps_exact_range() {
        let keyframes = KeyframeIndex::from_millis([0, 50_000]);
        let selector = StrategySelector::new(ExtractionMode::Reencode, Some(software()), &keyframes, 100, ts(90_000)).unwrap();
        let (directive, warnings) = selector.select(1, &segment(58_000, 61_000));
        assert!(warnings.is_empty());
        assert_eq!(directive.effective_range(), (ts(58_000), ts(61_000)));
        assert!(directive.encoder().is_some());
    }

    fn timeline(markers: &[(u64, &str)], total: u64) -> Timeline {
        let markers: Vec<ChapterMarker> = markers
            .iter()
            .map(|&(offset, title)| ChapterMarker::new(ts(offset), title, "--"))
            .collect();
        plan_segments(&markers, ts(total)).unwrap()
    }

    fn every_two_seconds(total: u64) -> KeyframeIndex {
        KeyframeIndex::from_millis((0..=total).step_by(2_000))
    }

    #[test]
    fn test_adjacent_kept_segments_meet_at_one_keyframe() {
        let keyframes = every_two_seconds(180_000);
        let timeline = timeline(&[(0, "Opening"), (61_000, "Main"), (120_000, "--CM"), (150_000, "End")], 180_000);
        let selector = StrategySelector::new(ExtractionMode::Copy, None, &keyframes, 100, ts(180_000)).unwrap();
        let (directives, warnings) = selector.select_all(&timeline);

        let ranges: Vec<_> = directives.iter().map(ExtractionDirective::effective_range).collect();
        assert_eq!(
            ranges,
            vec![
                (ts(0), ts(60_000)),
                (ts(60_000), ts(120_000)),
                (ts(150_000), ts(180_000)),
            ]
        );
        assert_eq!(ranges[0].1, ranges[1].0);

        let extracted: u64 = ranges.iter().map(|(start, end)| end.millis_since(*start).unwrap()).sum();
        assert_eq!(extracted, timeline.kept_duration_ms());

        // The shared join is reported once, on the later segment's start
        assert_eq!(
            warnings,
            vec![Warning::KeyframeDrift {
                segment: 1,
                boundary: Boundary::Start,
                requested: ts(61_000),
                snapped: ts(60_000),
                drift_ms: 1_000,
            }]
        );
    }

    #[test]
    fn test_separate_outputs_snap_every_end_forward() {
        let keyframes = every_two_seconds(180_000);
        let timeline = timeline(&[(0, "Opening"), (61_000, "Main")], 180_000);
        let selector = StrategySelector::new(ExtractionMode::Copy, None, &keyframes, 100, ts(180_000))
            .unwrap()
            .with_shared_joins(false);
        let (directives, _) = selector.select_all(&timeline);
        assert_eq!(directives[0].effective_range(), (ts(0), ts(62_000)));
        assert_eq!(directives[1].effective_range(), (ts(60_000), ts(180_000)));
    }

    #[test]
    fn test_segment_inside_one_gop_is_carried_by_the_next() {
        let keyframes = KeyframeIndex::from_millis([0, 10_000, 20_000]);
        let timeline = timeline(&[(0, "A"), (11_000, "B"), (12_000, "C")], 30_000);
        let selector = StrategySelector::new(ExtractionMode::Copy, None, &keyframes, 5_000, ts(30_000)).unwrap();
        let (directives, _) = selector.select_all(&timeline);

        let ranges: Vec<_> = directives.iter().map(ExtractionDirective::effective_range).collect();
        assert_eq!(ranges, vec![(ts(0), ts(10_000)), (ts(10_000), ts(30_000))]);
        assert_eq!(directives[1].segment_index, 2);
    }

    #[test]
    fn test_encoding_modes_require_an_encoder() {
        let keyframes = KeyframeIndex::default();
        for mode in [ExtractionMode::Accurate, ExtractionMode::Reencode] {
            let err = StrategySelector::new(mode, None, &keyframes, 100, ts(1_000)).unwrap_err();
            assert_eq!(err, StrategyError::MissingEncoder { mode: mode.to_string() });
        }
        let selector = StrategySelector::new(ExtractionMode::Copy, None, &keyframes, 100, ts(1_000)).unwrap();
        assert_eq!(selector.mode(), ExtractionMode::Copy);
    }
}
