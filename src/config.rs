use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    chapters::DEFAULT_EXCLUDE_PREFIX,
    error::{ConfigError, Result},
    strategy::{ExtractionMode, GpuPreference},
};

/// Main configuration for the chapter trimmer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chapter list handling
    pub chapters: ChapterConfig,

    /// How kept segments are pulled out of the source
    pub extraction: ExtractionConfig,

    /// Encoder settings for accurate and reencode modes
    pub encoder: EncoderConfig,

    /// External tool locations
    pub engine: EngineConfig,

    /// Scratch space for intermediate files
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.chapters.validate()?;
        self.extraction.validate()?;
        self.encoder.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Chapter list configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterConfig {
    /// Title prefix marking a segment for removal
    pub exclude_prefix: String,

    /// Write a recalculated chapter file next to the output
    pub generate: bool,
}

impl Default for ChapterConfig {
    fn default() -> Self {
        Self {
            exclude_prefix: DEFAULT_EXCLUDE_PREFIX.to_string(),
            generate: true,
        }
    }
}

impl ChapterConfig {
    fn validate(&self) -> Result<()> {
        if self.exclude_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "chapters.exclude_prefix".to_string(),
                value: format!("'{}'", self.exclude_prefix)
            }.into());
        }

        Ok(())
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// copy, accurate or reencode
    pub mode: String,

    /// Hardware encoder preference: none, auto, or a profile name
    pub gpu: String,

    /// Keyframe drift above this many milliseconds raises a warning
    pub drift_tolerance_ms: u64,

    /// Number of segments extracted concurrently
    pub workers: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Copy.to_string(),
            gpu: GpuPreference::None.to_string(),
            drift_tolerance_ms: 100,
            workers: num_cpus::get().clamp(1, 4),
        }
    }
}

impl ExtractionConfig {
    /// Parsed extraction mode
    pub fn mode(&self) -> Result<ExtractionMode> {
        Ok(self.mode.parse()?)
    }

    /// Parsed hardware encoder preference
    pub fn gpu(&self) -> Result<GpuPreference> {
        Ok(self.gpu.parse()?)
    }

    fn validate(&self) -> Result<()> {
        self.mode()?;
        self.gpu()?;

        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction.workers".to_string(),
                value: self.workers.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Software video encoder
    pub software_codec: String,

    /// Base constant rate factor, refined from the source bitrate when known
    pub crf: u8,

    /// Software encoder preset
    pub preset: String,

    /// Target audio codec; sources already in this codec are stream-copied
    pub audio_codec: String,

    /// Audio bitrate when the source bitrate is unknown
    pub audio_bitrate_kbps: u32,

    /// Ceiling for hardware encoder video bitrate (bits/s)
    pub max_gpu_bitrate: u64,

    /// Hardware encoder video bitrate when the source bitrate is unknown (bits/s)
    pub default_gpu_bitrate: u64,

    /// Fixed GOP so the output can be split losslessly later
    pub split_safe: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            software_codec: "libx264".to_string(),
            crf: 18,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
            max_gpu_bitrate: 20_000_000,
            default_gpu_bitrate: 5_000_000,
            split_safe: false,
        }
    }
}

impl EncoderConfig {
    fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.crf".to_string(),
                value: self.crf.to_string()
            }.into());
        }

        if self.audio_bitrate_kbps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.audio_bitrate_kbps".to_string(),
                value: self.audio_bitrate_kbps.to_string()
            }.into());
        }

        if self.default_gpu_bitrate == 0 || self.default_gpu_bitrate > self.max_gpu_bitrate {
            return Err(ConfigError::InvalidValue {
                key: "encoder.default_gpu_bitrate".to_string(),
                value: format!("{} (max {})", self.default_gpu_bitrate, self.max_gpu_bitrate)
            }.into());
        }

        Ok(())
    }
}

/// External media tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg executable
    pub ffmpeg: String,

    /// ffprobe executable
    pub ffprobe: String,

    /// Pass tool output through to the terminal
    pub show_tool_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            show_tool_output: false,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [("engine.ffmpeg", &self.ffmpeg), ("engine.ffprobe", &self.ffprobe)] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.clone()
                }.into());
            }
        }

        Ok(())
    }
}

/// Intermediate file workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for the scratch directory (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,

    /// Leave intermediate files in place after the run
    pub keep_temp: bool,
}
