use std::fmt;
use std::str::FromStr;

/// Millisecond-precision offset from the start of a video.
///
/// Chapter files write these as `H:MM:SS.mmm`: hours unpadded, minutes and
/// seconds two digits, milliseconds exactly three digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Convert fractional seconds (as reported by ffprobe) to the nearest millisecond
    pub fn from_secs_f64(seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            Self((seconds * 1000.0).round() as u64)
        } else {
            Self::ZERO
        }
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Milliseconds from `earlier` to `self`, or `None` if `earlier` is later
    pub fn millis_since(self, earlier: Timestamp) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }

    /// Absolute distance between two timestamps in milliseconds
    pub fn abs_diff(self, other: Timestamp) -> u64 {
        self.0.abs_diff(other.0)
    }

    pub fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// `HH:MM:SS.mmm` with two-digit hours, the form handed to ffmpeg's `-ss`/`-t`
    pub fn to_ffmpeg_arg(self) -> String {
        let (h, m, s, ms) = self.components();
        format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
    }

    fn components(self) -> (u64, u64, u64, u64) {
        let hours = self.0 / MS_PER_HOUR;
        let minutes = (self.0 % MS_PER_HOUR) / MS_PER_MINUTE;
        let seconds = (self.0 % MS_PER_MINUTE) / MS_PER_SECOND;
        let millis = self.0 % MS_PER_SECOND;
        (hours, minutes, seconds, millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s, ms) = self.components();
        write!(f, "{}:{:02}:{:02}.{:03}", h, m, s, ms)
    }
}

/// Why a timestamp string was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampParseError(pub String);

impl fmt::Display for TimestampParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TimestampParseError {}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| TimestampParseError(reason.to_string());

        let (clock, millis) = s
            .split_once('.')
            .ok_or_else(|| err("missing millisecond part"))?;
        if millis.len() != 3 || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("milliseconds must be exactly three digits"));
        }

        let mut fields = clock.split(':');
        let (Some(hours), Some(minutes), Some(seconds), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(err("expected H:MM:SS.mmm"));
        };

        if hours.is_empty() || !hours.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("hours must be digits"));
        }
        for field in [minutes, seconds] {
            if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("minutes and seconds must be two digits"));
            }
        }

        let hours: u64 = hours.parse().map_err(|_| err("hours out of range"))?;
        let minutes: u64 = minutes.parse().map_err(|_| err("invalid minutes"))?;
        let seconds: u64 = seconds.parse().map_err(|_| err("invalid seconds"))?;
        let millis: u64 = millis.parse().map_err(|_| err("invalid milliseconds"))?;

        if minutes >= 60 || seconds >= 60 {
            return Err(err("minutes and seconds must be < 60"));
        }

        hours
            .checked_mul(MS_PER_HOUR)
            .and_then(|total| total.checked_add(minutes * MS_PER_MINUTE + seconds * MS_PER_SECOND + millis))
            .map(Timestamp)
            .ok_or_else(|| err("hours out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let ts: Timestamp = "0:00:05.151".parse().unwrap();
        assert_eq!(ts.as_millis(), 5_151);

        let ts: Timestamp = "1:30:45.500".parse().unwrap();
        assert_eq!(ts.as_millis(), 5_445_500);
    }

    #[test]
    fn test_display_padding() {
        assert_eq!(Timestamp::from_millis(0).to_string(), "0:00:00.000");
        assert_eq!(Timestamp::from_millis(60_000).to_string(), "0:01:00.000");
        assert_eq!(Timestamp::from_millis(36_005_007).to_string(), "10:00:05.007");
    }

    #[test]
    fn test_format_is_stable_for_parsed_values() {
        for text in ["0:00:05.151", "0:26:25.064", "2:05:09.900", "12:59:59.999"] {
            let ts: Timestamp = text.parse().unwrap();
            assert_eq!(ts.to_string(), text);
        }
    }

    #[test]
    fn test_ffmpeg_arg() {
        let ts = Timestamp::from_millis(5_445_500);
        assert_eq!(ts.to_ffmpeg_arg(), "01:30:45.500");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("0:00:05.15".parse::<Timestamp>().is_err());
        assert!("0:00:05".parse::<Timestamp>().is_err());
        assert!("0:0:05.000".parse::<Timestamp>().is_err());
        assert!("0:61:05.000".parse::<Timestamp>().is_err());
        assert!("0:00:60.000".parse::<Timestamp>().is_err());
        assert!(":00:05.000".parse::<Timestamp>().is_err());
        assert!("0:00:00:05.000".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_from_secs_rounds() {
        assert_eq!(Timestamp::from_secs_f64(1.0016).as_millis(), 1_002);
        assert_eq!(Timestamp::from_secs_f64(-3.0), Timestamp::ZERO);
        assert_eq!(Timestamp::from_secs_f64(f64::NAN), Timestamp::ZERO);
    }

    #[test]
    fn test_millis_since() {
        let a = Timestamp::from_millis(10_000);
        let b = Timestamp::from_millis(4_000);
        assert_eq!(a.millis_since(b), Some(6_000));
        assert_eq!(b.millis_since(a), None);
        assert_eq!(b.abs_diff(a), 6_000);
    }
}
