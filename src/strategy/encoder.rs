use std::fmt;
use std::str::FromStr;

use crate::config::EncoderConfig;
use crate::engine::StreamSummary;
use crate::error::{StrategyError, Warning};

/// Hardware video encoders the trimmer knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareProfile {
    VideoToolbox,
    Nvenc,
    Qsv,
    Amf,
}

impl HardwareProfile {
    pub const ALL: [HardwareProfile; 4] = [Self::VideoToolbox, Self::Nvenc, Self::Qsv, Self::Amf];

    /// Name used on the command line and in configuration files
    pub fn name(self) -> &'static str {
        match self {
            Self::VideoToolbox => "videotoolbox",
            Self::Nvenc => "nvenc",
            Self::Qsv => "qsv",
            Self::Amf => "amf",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VideoToolbox => "VideoToolbox (macOS)",
            Self::Nvenc => "NVIDIA NVENC",
            Self::Qsv => "Intel Quick Sync",
            Self::Amf => "AMD AMF",
        }
    }

    /// ffmpeg encoder name
    pub fn encoder(self) -> &'static str {
        match self {
            Self::VideoToolbox => "h264_videotoolbox",
            Self::Nvenc => "h264_nvenc",
            Self::Qsv => "h264_qsv",
            Self::Amf => "h264_amf",
        }
    }

    fn params(self) -> &'static [&'static str] {
        match self {
            Self::VideoToolbox => &["-profile:v", "high", "-level", "4.2"],
            Self::Nvenc => &["-preset", "p4", "-tune", "hq", "-profile:v", "high"],
            Self::Qsv => &["-preset", "medium", "-profile:v", "high"],
            Self::Amf => &["-quality", "balanced", "-profile:v", "high"],
        }
    }

    fn split_safe_params(self) -> &'static [&'static str] {
        match self {
            Self::Nvenc => &["-g", "60", "-strict_gop", "1"],
            _ => &["-g", "60"],
        }
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the user asked for with `--gpu`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPreference {
    /// Software encoding only
    #[default]
    None,
    /// First available hardware encoder for this platform, else software
    Auto,
    Profile(HardwareProfile),
}

impl FromStr for GpuPreference {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "cpu" | "software" => Ok(Self::None),
            "auto" => Ok(Self::Auto),
            other => HardwareProfile::ALL
                .into_iter()
                .find(|p| p.name() == other)
                .map(Self::Profile)
                .ok_or_else(|| StrategyError::UnknownEncoderProfile { value: s.to_string() }),
        }
    }
}

impl fmt::Display for GpuPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Auto => f.write_str("auto"),
            Self::Profile(p) => f.write_str(p.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Hardware encoders to try for `--gpu auto`, most preferred first
    pub fn auto_candidates(self) -> &'static [HardwareProfile] {
        match self {
            Self::MacOs => &[HardwareProfile::VideoToolbox],
            Self::Windows => &[HardwareProfile::Nvenc, HardwareProfile::Amf, HardwareProfile::Qsv],
            Self::Linux => &[HardwareProfile::Nvenc, HardwareProfile::Qsv],
        }
    }
}

/// Which hardware profiles need an availability probe for a preference
pub fn probe_candidates(preference: GpuPreference, platform: Platform) -> Vec<HardwareProfile> {
    match preference {
        GpuPreference::None => Vec::new(),
        GpuPreference::Auto => platform.auto_candidates().to_vec(),
        GpuPreference::Profile(profile) => vec![profile],
    }
}

/// A concrete encoder choice with its ffmpeg arguments, tuned to the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    pub label: String,
    pub hardware: Option<HardwareProfile>,
    /// `-c:v ...` and codec options
    pub video_args: Vec<String>,
    /// Audio arguments used when a whole segment is re-encoded
    pub audio_args: Vec<String>,
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

impl EncoderProfile {
    pub fn software(settings: &EncoderConfig, source: &StreamSummary) -> Self {
        let mut video_args = owned(&["-c:v", settings.software_codec.as_str()]);

        // Quality follows the source bitrate when it is known
        let crf = match source.video_bitrate {
            Some(rate) if rate > 10_000_000 => 17,
            Some(rate) if rate > 5_000_000 => 18,
            Some(_) => 20,
            None => settings.crf,
        };
        video_args.extend(["-crf".to_string(), crf.to_string()]);
        video_args.extend(["-preset".to_string(), settings.preset.clone()]);

        if let Some(rate) = &source.frame_rate {
            video_args.extend(["-r".to_string(), rate.clone()]);
        }

        if settings.split_safe {
            video_args.extend(owned(&["-g", "60", "-keyint_min", "30", "-sc_threshold", "0"]));
        }

        Self {
            label: format!("software ({})", settings.software_codec),
            hardware: None,
            video_args,
            audio_args: audio_args(settings, source),
        }
    }

    pub fn hardware(profile: HardwareProfile, settings: &EncoderConfig, source: &StreamSummary) -> Self {
        let mut video_args = owned(&["-c:v", profile.encoder()]);
        video_args.extend(owned(profile.params()));

        let bitrate = source
            .video_bitrate
            .map(|rate| rate.min(settings.max_gpu_bitrate))
            .unwrap_or(settings.default_gpu_bitrate);
        video_args.extend(["-b:v".to_string(), bitrate.to_string()]);

        if settings.split_safe {
            video_args.extend(owned(profile.split_safe_params()));
        }

        Self {
            label: profile.label().to_string(),
            hardware: Some(profile),
            video_args,
            audio_args: audio_args(settings, source),
        }
    }
}

fn audio_args(settings: &EncoderConfig, source: &StreamSummary) -> Vec<String> {
    match source.audio_codec.as_deref() {
        Some(codec) if codec == settings.audio_codec => owned(&["-c:a", "copy"]),
        _ => {
            let kbps = source
                .audio_bitrate
                .map(|bps| (bps.min(320_000) / 1000) as u32)
                .filter(|&k| k > 0)
                .unwrap_or(settings.audio_bitrate_kbps);
            vec![
                "-c:a".to_string(),
                settings.audio_codec.clone(),
                "-b:a".to_string(),
                format!("{}k", kbps),
            ]
        }
    }
}

/// The encoder to use plus any fallback that happened on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderResolution {
    pub profile: EncoderProfile,
    pub warning: Option<Warning>,
}

/// Pick an encoder for `preference`.
///
/// `is_available` answers whether a hardware profile works on this host.
/// An unavailable explicit request degrades to software with a warning;
/// `auto` silently uses software when nothing is found.
pub fn resolve_encoder<F>(
    preference: GpuPreference,
    platform: Platform,
    settings: &EncoderConfig,
    source: &StreamSummary,
    mut is_available: F,
) -> EncoderResolution
where
    F: FnMut(HardwareProfile) -> bool,
{
    let software = || EncoderProfile::software(settings, source);

    match preference {
        GpuPreference::None => EncoderResolution {
            profile: software(),
            warning: None,
        },
        GpuPreference::Auto => {
            let profile = platform
                .auto_candidates()
                .iter()
                .copied()
                .find(|&p| is_available(p))
                .map(|p| EncoderProfile::hardware(p, settings, source))
                .unwrap_or_else(software);
            EncoderResolution { profile, warning: None }
        }
        GpuPreference::Profile(requested) => {
            if is_available(requested) {
                EncoderResolution {
                    profile: EncoderProfile::hardware(requested, settings, source),
                    warning: None,
                }
            } else {
                let profile = software();
                let warning = Warning::EncoderFallback {
                    requested: requested.label().to_string(),
                    used: profile.label.clone(),
                };
                EncoderResolution {
                    profile,
                    warning: Some(warning),
                }
            }
        }
    }
}
