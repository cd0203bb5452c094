use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::chapters::Timestamp;
use crate::config::EngineConfig;
use crate::engine::{EngineCommand, EngineStep, ExtractionJob, MediaEngine, MediaProbe, StreamSummary};
use crate::error::EngineError;
use crate::strategy::{ExtractionPlan, HardwareProfile, KeyframeIndex, PartMethod, SubRange};

/// Lines of tool stderr kept in error messages
const STDERR_TAIL_LINES: usize = 8;

/// Containers that benefit from moving the index to the front
const FASTSTART_EXTENSIONS: [&str; 3] = ["mp4", "m4v", "mov"];

/// [`MediaEngine`] backed by the `ffmpeg` and `ffprobe` executables
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    config: EngineConfig,
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    bit_rate: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct PacketOutput {
    #[serde(default)]
    packets: Vec<Packet>,
}

#[derive(Deserialize)]
struct Packet {
    pts_time: Option<String>,
    flags: Option<String>,
}

fn parse_number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

fn usable_rate(rate: Option<&String>) -> Option<String> {
    rate.filter(|r| !r.is_empty() && !r.starts_with('0')).cloned()
}

/// Duration and stream summary from `ffprobe -show_format -show_streams -of json`
fn parse_probe_output(json: &str, path: &Path) -> Result<(Timestamp, StreamSummary), EngineError> {
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| EngineError::Probe {
        path: path.to_path_buf(),
        reason: format!("unreadable ffprobe output: {}", e),
    })?;

    let video = probe.streams.iter().find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = probe.streams.iter().find(|s| s.codec_type.as_deref() == Some("audio"));

    let format_duration = probe.format.as_ref().and_then(|f| parse_number::<f64>(f.duration.as_ref()));
    let stream_duration = video.and_then(|v| parse_number::<f64>(v.duration.as_ref()));
    let duration = format_duration
        .or(stream_duration)
        .map(Timestamp::from_secs_f64)
        .filter(|d| *d > Timestamp::ZERO)
        .ok_or_else(|| EngineError::Probe {
            path: path.to_path_buf(),
            reason: "no duration reported".to_string(),
        })?;

    let streams = StreamSummary {
        video_bitrate: video
            .and_then(|v| parse_number(v.bit_rate.as_ref()))
            .or_else(|| probe.format.as_ref().and_then(|f| parse_number(f.bit_rate.as_ref()))),
        frame_rate: video.and_then(|v| usable_rate(v.avg_frame_rate.as_ref()).or_else(|| usable_rate(v.r_frame_rate.as_ref()))),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        audio_bitrate: audio.and_then(|a| parse_number(a.bit_rate.as_ref())),
    };

    Ok((duration, streams))
}

/// Keyframe offsets from `ffprobe -show_entries packet=pts_time,flags -of json`
fn parse_keyframes(json: &str, path: &Path) -> Result<KeyframeIndex, EngineError> {
    let output: PacketOutput = serde_json::from_str(json).map_err(|e| EngineError::Probe {
        path: path.to_path_buf(),
        reason: format!("unreadable packet list: {}", e),
    })?;

    let offsets = output
        .packets
        .iter()
        .filter(|p| p.flags.as_deref().is_some_and(|f| f.starts_with('K')))
        .filter_map(|p| parse_number::<f64>(p.pts_time.as_ref()))
        .map(Timestamp::from_secs_f64)
        .collect();
    Ok(KeyframeIndex::new(offsets))
}

fn seconds_arg(millis: u64) -> String {
    format!("{}.{:03}", millis / 1000, millis % 1000)
}

fn wants_faststart(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FASTSTART_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// One `file '...'` line per artifact, quoted for the concat demuxer
fn concat_list(artifacts: &[PathBuf]) -> String {
    artifacts
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

/// A missing executable is `ToolNotFound`; any other spawn failure stays an I/O error
fn spawn_error(program: &str, error: std::io::Error) -> EngineError {
    if error.kind() == std::io::ErrorKind::NotFound {
        EngineError::ToolNotFound {
            program: program.to_string(),
            reason: error.to_string(),
        }
    } else {
        EngineError::Io(error)
    }
}

fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn ffmpeg(&self, description: impl Into<String>) -> EngineCommand {
        let command = EngineCommand::new(&self.config.ffmpeg, description).args(["-hide_banner", "-nostdin"]);
        let command = if self.config.show_tool_output {
            command
        } else {
            command.args(["-loglevel", "error"])
        };
        command.arg("-y")
    }

    fn copy_command(&self, source: &Path, start: Timestamp, end: Timestamp, destination: &Path, description: String) -> EngineCommand {
        self.ffmpeg(description)
            .args(["-ss".to_string(), start.to_ffmpeg_arg(), "-i".to_string()])
            .path_arg(source)
            .args(["-t".to_string(), seconds_arg(end.millis_since(start).unwrap_or(0))])
            .args(["-c", "copy", "-avoid_negative_ts", "make_zero"])
            .path_arg(destination)
    }

    fn encode_command(
        &self,
        source: &Path,
        range: (Timestamp, Timestamp),
        video_args: &[String],
        audio_args: &[String],
        destination: &Path,
        description: String,
    ) -> EngineCommand {
        let (start, end) = range;
        // Input seeking is frame-accurate when the video is decoded
        self.ffmpeg(description)
            .args(["-ss".to_string(), start.to_ffmpeg_arg(), "-i".to_string()])
            .path_arg(source)
            .args(["-t".to_string(), seconds_arg(end.millis_since(start).unwrap_or(0))])
            .args(video_args.iter().cloned())
            .args(audio_args.iter().cloned())
            .args(["-avoid_negative_ts", "make_zero"])
            .path_arg(destination)
    }

    fn concat_with_list(&self, list_path: PathBuf, artifacts: &[PathBuf], output: &Path, description: String) -> Vec<EngineStep> {
        let mut command = self
            .ffmpeg(description)
            .args(["-f", "concat", "-safe", "0", "-i"])
            .path_arg(&list_path)
            .args(["-map", "0", "-c", "copy"]);
        if wants_faststart(output) {
            command = command.args(["-movflags", "+faststart"]);
        }
        vec![
            EngineStep::WriteFile {
                path: list_path,
                contents: concat_list(artifacts),
            },
            EngineStep::Run(command.path_arg(output)),
        ]
    }

    fn accurate_steps(&self, job: &ExtractionJob, parts: &[SubRange], video_args: &[String]) -> Vec<EngineStep> {
        let extension = job
            .destination
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mkv");
        let audio_copy = ["-c:a".to_string(), "copy".to_string()];
        let single = parts.len() == 1;

        let mut steps = Vec::with_capacity(parts.len() + 2);
        let mut part_paths = Vec::with_capacity(parts.len());
        for (n, part) in parts.iter().enumerate() {
            let destination = if single {
                job.destination.clone()
            } else {
                job.scratch_dir
                    .join(format!("segment_{:03}_part{}.{}", job.position, n, extension))
            };
            let command = match part.method {
                PartMethod::Copy => self.copy_command(
                    &job.source,
                    part.start,
                    part.end,
                    &destination,
                    format!("segment {} part {} (copy)", job.directive.segment_index, n),
                ),
                PartMethod::Encode => self.encode_command(
                    &job.source,
                    (part.start, part.end),
                    video_args,
                    &audio_copy,
                    &destination,
                    format!("segment {} part {} (encode)", job.directive.segment_index, n),
                ),
            };
            steps.push(EngineStep::Run(command));
            part_paths.push(destination);
        }

        if !single {
            let list_path = job.scratch_dir.join(format!("segment_{:03}_parts.txt", job.position));
            steps.extend(self.concat_with_list(
                list_path,
                &part_paths,
                &job.destination,
                format!("segment {} join parts", job.directive.segment_index),
            ));
        }
        steps
    }

    async fn run(&self, command: &EngineCommand) -> Result<(), EngineError> {
        debug!("{}: {}", command.description, command);

        let mut process = Command::new(&command.program);
        process.args(&command.args).stdin(Stdio::null()).kill_on_drop(true);

        let failed_to_start = |e| spawn_error(&command.program, e);

        let (status, stderr) = if self.config.show_tool_output {
            let status = process.status().await.map_err(failed_to_start)?;
            (status, String::new())
        } else {
            let output = process.output().await.map_err(failed_to_start)?;
            (output.status, tail(&output.stderr))
        };

        if status.success() {
            Ok(())
        } else {
            let reason = match (status.code(), stderr.is_empty()) {
                (Some(code), true) => format!("exit status {}", code),
                (Some(code), false) => format!("exit status {}: {}", code, stderr),
                (None, _) => "terminated by signal".to_string(),
            };
            Err(EngineError::CommandFailed {
                command: command.description.clone(),
                reason,
            })
        }
    }

    async fn capture(&self, program: &str, args: &[String], source: &Path) -> Result<String, EngineError> {
        let output = Command::new(program)
            .args(args)
            .arg(source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(program, e))?;

        if !output.status.success() {
            return Err(EngineError::Probe {
                path: source.to_path_buf(),
                reason: tail(&output.stderr),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MediaEngine for FfmpegEngine {
    async fn check_available(&self) -> Result<(), EngineError> {
        for program in [&self.config.ffmpeg, &self.config.ffprobe] {
            let status = Command::new(program)
                .arg("-version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|e| EngineError::ToolNotFound {
                    program: program.clone(),
                    reason: e.to_string(),
                })?;
            if !status.success() {
                return Err(EngineError::ToolNotFound {
                    program: program.clone(),
                    reason: format!("`{} -version` exited with {}", program, status),
                });
            }
        }
        Ok(())
    }

    async fn probe(&self, source: &Path) -> Result<MediaProbe, EngineError> {
        let format_args: Vec<String> = ["-v", "error", "-print_format", "json", "-show_format", "-show_streams"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let json = self.capture(&self.config.ffprobe, &format_args, source).await?;
        let (duration, streams) = parse_probe_output(&json, source)?;

        let packet_args: Vec<String> = [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts_time,flags",
            "-print_format",
            "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let json = self.capture(&self.config.ffprobe, &packet_args, source).await?;
        let keyframes = parse_keyframes(&json, source)?;

        debug!(
            "Probed {}: duration {}, {} keyframes, {:?}",
            source.display(),
            duration,
            keyframes.len(),
            streams
        );
        Ok(MediaProbe {
            duration,
            keyframes,
            streams,
        })
    }

    async fn encoder_available(&self, profile: HardwareProfile) -> bool {
        let result = Command::new(&self.config.ffmpeg)
            .args(["-hide_banner", "-nostdin", "-loglevel", "error"])
            .args(["-f", "lavfi", "-i", "color=c=black:s=320x240:d=1"])
            .args(["-c:v", profile.encoder(), "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        let available = matches!(result, Ok(status) if status.success());
        debug!("Encoder {} available: {}", profile.encoder(), available);
        available
    }

    fn extraction_steps(&self, job: &ExtractionJob) -> Vec<EngineStep> {
        let directive = &job.directive;
        let index = directive.segment_index;
        match &directive.plan {
            ExtractionPlan::Copy { start, end } => vec![EngineStep::Run(self.copy_command(
                &job.source,
                start.snapped,
                end.snapped,
                &job.destination,
                format!("segment {} (copy)", index),
            ))],
            ExtractionPlan::Reencode { encoder } => vec![EngineStep::Run(self.encode_command(
                &job.source,
                (directive.segment.start, directive.segment.end),
                &encoder.video_args,
                &encoder.audio_args,
                &job.destination,
                format!("segment {} (reencode, {})", index, encoder.label),
            ))],
            ExtractionPlan::Accurate { parts, encoder } => self.accurate_steps(job, parts, &encoder.video_args),
        }
    }

    fn concat_steps(&self, artifacts: &[PathBuf], output: &Path, scratch_dir: &Path) -> Vec<EngineStep> {
        self.concat_with_list(
            scratch_dir.join("concat_list.txt"),
            artifacts,
            output,
            format!("join {} segments", artifacts.len()),
        )
    }

    async fn execute(&self, step: &EngineStep) -> Result<(), EngineError> {
        match step {
            EngineStep::Run(command) => self.run(command).await,
            EngineStep::WriteFile { path, contents } => {
                tokio::fs::write(path, contents).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;
    use crate::strategy::{snap_end, snap_start, EncoderProfile, ExtractionDirective};
    use crate::timeline::Segment;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn engine() -> FfmpegEngine {
        FfmpegEngine::new(EngineConfig::default())
    }

    fn segment(start: u64, end: u64) -> Segment {
        Segment {
            start: ts(start),
            end: ts(end),
            excluded: false,
            title: "Main".to_string(),
        }
    }

    fn job(plan: ExtractionPlan, seg: Segment) -> ExtractionJob {
        ExtractionJob {
            position: 1,
            directive: ExtractionDirective {
                segment_index: 2,
                segment: seg,
                plan,
            },
            source: PathBuf::from("/videos/in.mp4"),
            destination: PathBuf::from("/scratch/segment_001.mp4"),
            scratch_dir: PathBuf::from("/scratch"),
        }
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "bit_rate": "8000000",
                 "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac", "bit_rate": "128000"}
            ],
            "format": {"duration": "180.042", "bit_rate": "8200000"}
        }"#;
        let (duration, streams) = parse_probe_output(json, Path::new("in.mp4")).unwrap();
        assert_eq!(duration, ts(180_042));
        assert_eq!(streams.video_bitrate, Some(8_000_000));
        assert_eq!(streams.frame_rate.as_deref(), Some("30000/1001"));
        assert_eq!(streams.audio_codec.as_deref(), Some("aac"));
        assert_eq!(streams.audio_bitrate, Some(128_000));
    }

    #[test]
    fn test_parse_probe_falls_back_to_format_bitrate() {
        let json = r#"{
            "streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}],
            "format": {"duration": "10.5", "bit_rate": "3000000"}
        }"#;
        let (_, streams) = parse_probe_output(json, Path::new("in.mkv")).unwrap();
        assert_eq!(streams.video_bitrate, Some(3_000_000));
        assert_eq!(streams.frame_rate.as_deref(), Some("25/1"));
        assert_eq!(streams.audio_codec, None);
    }

    #[test]
    fn test_parse_probe_without_duration() {
        let json = r#"{"streams": [], "format": {}}"#;
        let err = parse_probe_output(json, Path::new("in.mp4")).unwrap_err();
        assert!(matches!(err, EngineError::Probe { .. }));
    }

    #[test]
    fn test_parse_keyframes() {
        let json = r#"{"packets": [
            {"pts_time": "0.000000", "flags": "K__"},
            {"pts_time": "0.033367", "flags": "___"},
            {"pts_time": "2.002000", "flags": "K__"},
            {"pts_time": "N/A", "flags": "K__"},
            {"pts_time": "4.004000", "flags": "K_"}
        ]}"#;
        let index = parse_keyframes(json, Path::new("in.mp4")).unwrap();
        assert_eq!(index, KeyframeIndex::from_millis([0, 2_002, 4_004]));
    }

    #[test]
    fn test_copy_steps() {
        let keyframes = KeyframeIndex::from_millis([0, 50_000, 120_000]);
        let plan = ExtractionPlan::Copy {
            start: snap_start(&keyframes, ts(58_000)),
            end: snap_end(&keyframes, ts(120_000), ts(180_000)),
        };
        let steps = engine().extraction_steps(&job(plan, segment(58_000, 120_000)));
        assert_eq!(steps.len(), 1);
        let EngineStep::Run(command) = &steps[0] else {
            panic!("expected a command");
        };
        let line = command.to_string();
        assert!(line.starts_with("ffmpeg -hide_banner -nostdin -loglevel error -y -ss 00:00:50.000 -i /videos/in.mp4 -t 70.000 -c copy"));
        assert!(line.ends_with("/scratch/segment_001.mp4"));
    }

    #[test]
    fn test_reencode_steps_use_encoder_args() {
        let encoder = EncoderProfile::software(&EncoderConfig::default(), &StreamSummary::default());
        let plan = ExtractionPlan::Reencode { encoder };
        let steps = engine().extraction_steps(&job(plan, segment(58_000, 120_000)));
        let EngineStep::Run(command) = &steps[0] else {
            panic!("expected a command");
        };
        assert!(command.args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(command.args.windows(2).any(|w| w == ["-t", "62.000"]));
        assert!(command.args.windows(2).any(|w| w == ["-c:a", "aac"]));
    }

    #[test]
    fn test_accurate_steps_join_parts() {
        let encoder = EncoderProfile::software(&EncoderConfig::default(), &StreamSummary::default());
        let parts = vec![
            SubRange { start: ts(58_000), end: ts(60_000), method: PartMethod::Encode },
            SubRange { start: ts(60_000), end: ts(118_000), method: PartMethod::Copy },
            SubRange { start: ts(118_000), end: ts(120_000), method: PartMethod::Encode },
        ];
        let plan = ExtractionPlan::Accurate { parts, encoder };
        let steps = engine().extraction_steps(&job(plan, segment(58_000, 120_000)));

        assert_eq!(steps.len(), 5);
        let EngineStep::WriteFile { path, contents } = &steps[3] else {
            panic!("expected the parts list");
        };
        assert_eq!(path, &PathBuf::from("/scratch/segment_001_parts.txt"));
        assert_eq!(
            contents,
            "file '/scratch/segment_001_part0.mp4'\nfile '/scratch/segment_001_part1.mp4'\nfile '/scratch/segment_001_part2.mp4'\n"
        );
        let EngineStep::Run(first) = &steps[0] else {
            panic!("expected a command");
        };
        // Encoded parts keep the source audio so they join with copied parts
        assert!(first.args.windows(2).any(|w| w == ["-c:a", "copy"]));
        let EngineStep::Run(join) = &steps[4] else {
            panic!("expected a command");
        };
        assert_eq!(join.args.last().map(String::as_str), Some("/scratch/segment_001.mp4"));
    }

    #[test]
    fn test_concat_steps() {
        let artifacts = vec![PathBuf::from("/scratch/a.mp4"), PathBuf::from("/scratch/it's.mp4")];
        let steps = engine().concat_steps(&artifacts, Path::new("/out/edited.mp4"), Path::new("/scratch"));
        let EngineStep::WriteFile { contents, .. } = &steps[0] else {
            panic!("expected the concat list");
        };
        assert_eq!(contents, "file '/scratch/a.mp4'\nfile '/scratch/it'\\''s.mp4'\n");
        let EngineStep::Run(command) = &steps[1] else {
            panic!("expected a command");
        };
        assert!(command.args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
        assert!(command.args.windows(2).any(|w| w == ["-f", "concat"]));
    }

    #[test]
    fn test_quiet_unless_tool_output_requested() {
        let loud = FfmpegEngine::new(EngineConfig {
            show_tool_output: true,
            ..EngineConfig::default()
        });
        assert!(!loud.ffmpeg("x").args.contains(&"-loglevel".to_string()));
        assert!(engine().ffmpeg("x").args.contains(&"-loglevel".to_string()));
    }

    #[tokio::test]
    async fn test_probe_reports_missing_tool() {
        let engine = FfmpegEngine::new(EngineConfig {
            ffprobe: "/nonexistent/chapter-trimmer/ffprobe".to_string(),
            ..EngineConfig::default()
        });
        let err = engine.probe(Path::new("in.mp4")).await.unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_keeps_permission_errors_as_io() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("ffprobe");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();

        let engine = FfmpegEngine::new(EngineConfig {
            ffprobe: tool.to_string_lossy().into_owned(),
            ..EngineConfig::default()
        });
        let err = engine.probe(Path::new("in.mp4")).await.unwrap_err();
        match err {
            EngineError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
