use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    chapters::{write_chapter_file, ChapterMarker, ChapterParser, ChapterRecalculator, Timestamp},
    config::Config,
    engine::{ExtractionJob, MediaEngine, MediaProbe},
    error::{Result, TimelineError, TrimmerError, Warning},
    pipeline::{
        cancel::CancellationToken,
        orchestrator::Orchestrator,
        summary::RunSummary,
        workdir::{artifact_path, WorkDir},
    },
    strategy::{
        probe_candidates, resolve_encoder, EncoderResolution, ExtractionDirective, GpuPreference, Platform,
        StrategySelector,
    },
    timeline::{plan_segments, Timeline},
};

/// File name pattern used when splitting without an explicit pattern
pub const DEFAULT_SPLIT_PATTERN: &str = "{num} - {title}";

const MAX_TITLE_CHARS: usize = 50;
const FALLBACK_EXTENSION: &str = "mp4";

/// Write each kept segment to its own file instead of joining them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    /// Defaults to a directory named after the source, beside it
    pub directory: Option<PathBuf>,
    /// `{num}` is the 2-digit position among kept segments, `{title}` the chapter title
    pub pattern: String,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            directory: None,
            pattern: DEFAULT_SPLIT_PATTERN.to_string(),
        }
    }
}

/// Inputs of one trim run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRequest {
    pub chapter_file: PathBuf,
    pub source: PathBuf,
    /// Defaults to `<stem>_edited.<ext>` beside the source
    pub output: Option<PathBuf>,
    pub split: Option<SplitOptions>,
    pub dry_run: bool,
    pub overwrite: bool,
}

impl TrimRequest {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(chapter_file: P, source: Q) -> Self {
        Self {
            chapter_file: chapter_file.into(),
            source: source.into(),
            output: None,
            split: None,
            dry_run: false,
            overwrite: false,
        }
    }
}

/// Where the run's results go
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputTarget {
    Joined(PathBuf),
    Split { directory: PathBuf, files: Vec<PathBuf> },
}

impl OutputTarget {
    fn files(&self) -> Vec<PathBuf> {
        match self {
            Self::Joined(path) => vec![path.clone()],
            Self::Split { files, .. } => files.clone(),
        }
    }
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str()).filter(|e| !e.is_empty())
}

/// `<stem>_edited.<ext>` next to `source`
pub fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = extension_of(source).unwrap_or(FALLBACK_EXTENSION);
    source.with_file_name(format!("{}_edited.{}", stem, extension))
}

/// Chapter file written alongside `output`
pub fn chapter_file_path(output: &Path) -> PathBuf {
    output.with_extension("txt")
}

/// Make a chapter title usable as a file name
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if "<>:\"/\\|?*".contains(c) || c.is_control() { '_' } else { c })
        .take(MAX_TITLE_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// File name for the `number`th (1-based) kept segment in split mode
pub fn split_file_name(pattern: &str, number: usize, title: &str, extension: &str) -> String {
    let name = pattern
        .replace("{num}", &format!("{:02}", number))
        .replace("{title}", &sanitize_title(title));
    format!("{}.{}", name, extension)
}

/// Both paths exist and resolve to the same file
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn default_split_directory(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segments".to_string());
    source.with_file_name(stem)
}

/// End-to-end driver: chapters, probe, plan, strategy, extraction, chapters out
///
/// The pipeline:
/// 1. Chapter parsing - read and validate the chapter list
/// 2. Probing and planning - source duration, keyframes, keep/drop segments
/// 3. Strategy selection - copy, accurate or reencode per kept segment
/// 4. Extraction - bounded-concurrency extraction, then concatenation
/// 5. Chapter output - recalculated chapters for the edited video
pub struct Trimmer<E: MediaEngine> {
    config: Config,
    engine: Arc<E>,
    cancel: CancellationToken,
    platform: Platform,
}

impl<E: MediaEngine> Trimmer<E> {
    pub fn new(config: Config, engine: E) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            cancel: CancellationToken::new(),
            platform: Platform::current(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override host platform detection for hardware encoder selection
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run the whole pipeline for one source
    pub async fn run(&self, request: &TrimRequest) -> Result<RunSummary> {
        self.config.validate()?;
        let mode = self.config.extraction.mode()?;
        let gpu = self.config.extraction.gpu()?;

        info!("🎬 Starting chapter trim{}", if request.dry_run { " (dry run)" } else { "" });
        info!("   Source: {:?}", request.source);
        info!("   Chapters: {:?}", request.chapter_file);
        info!("   Mode: {}", mode);

        // Pipeline Step 1: Chapter parsing
        let markers = self.read_chapters(&request.chapter_file).await?;

        // Pipeline Step 2: Probe and plan
        let source_size = self.check_source(&request.source).await?;
        if !request.dry_run {
            self.engine.check_available().await?;
        }
        self.ensure_not_cancelled()?;
        let probe = self.engine.probe(&request.source).await?;
        info!(
            "🔍 Source duration {}, {} keyframes",
            probe.duration,
            probe.keyframes.len()
        );
        let timeline = plan_segments(&markers, probe.duration)?;
        if timeline.kept_count() == 0 {
            return Err(TimelineError::NothingKept.into());
        }
        let chapters =
            ChapterRecalculator::new(self.config.chapters.exclude_prefix.as_str()).recalculate(timeline.segments())?;
        let target = self.resolve_target(request, &timeline)?;
        let chapter_file = self.chapter_output(request, &target)?;

        // Pipeline Step 3: Strategy selection
        let mut warnings: Vec<Warning> = Vec::new();
        let encoder = if mode.needs_encoder() {
            let resolution = self.pick_encoder(gpu, &probe).await;
            if let Some(warning) = resolution.warning {
                warn!("{}", warning);
                warnings.push(warning);
            }
            info!("🎛️  Encoder: {}", resolution.profile.label);
            Some(resolution.profile)
        } else {
            None
        };
        let selector = StrategySelector::new(
            mode,
            encoder.clone(),
            &probe.keyframes,
            self.config.extraction.drift_tolerance_ms,
            probe.duration,
        )?
        .with_shared_joins(matches!(target, OutputTarget::Joined(_)));
        let (directives, drift_warnings) = selector.select_all(&timeline);
        warnings.extend(drift_warnings);

        // Pipeline Step 4: Extraction and concatenation
        let orchestrator = Orchestrator::new(
            Arc::clone(&self.engine),
            self.config.extraction.workers,
            self.cancel.clone(),
        );
        let temp_parent = self.config.workspace.temp_dir.as_deref();
        let concat_output = match &target {
            OutputTarget::Joined(path) => Some(path.as_path()),
            OutputTarget::Split { .. } => None,
        };

        let steps = if request.dry_run {
            let scratch = WorkDir::planned(temp_parent);
            let jobs = self.jobs(directives, &request.source, &target, &scratch);
            let plan = orchestrator.plan(jobs, concat_output, &scratch);
            info!("📋 Dry run: {} steps planned", plan.steps().len());
            plan.steps()
        } else {
            if let OutputTarget::Split { directory, .. } = &target {
                tokio::fs::create_dir_all(directory).await?;
            }
            let workdir = WorkDir::create(temp_parent, self.config.workspace.keep_temp)?;
            let jobs = self.jobs(directives, &request.source, &target, workdir.path());
            let plan = orchestrator.plan(jobs, concat_output, workdir.path());
            orchestrator.execute(&plan).await?;
            plan.steps()
        };

        // Pipeline Step 5: Chapter output
        if let Some(path) = &chapter_file {
            if !request.dry_run {
                write_chapter_file(&chapters, path).await?;
                info!("📝 Wrote {} chapters to {:?}", chapters.len(), path);
            }
        }

        let outputs = target.files();
        let output_size = if request.dry_run {
            None
        } else {
            self.total_size(&outputs).await
        };

        let summary = RunSummary {
            dry_run: request.dry_run,
            mode,
            encoder: encoder.map(|e| e.label),
            source_duration: probe.duration,
            output_duration: Timestamp::from_millis(timeline.kept_duration_ms()),
            segments_total: timeline.segments().len(),
            segments_kept: timeline.kept_count(),
            outputs,
            chapter_file,
            chapters,
            warnings,
            steps,
            source_size: Some(source_size),
            output_size,
        };

        if let Some(percent) = summary.size_reduction_percent() {
            debug!("Output is {:.1}% smaller than the source", percent);
        }
        if request.dry_run {
            info!("🎉 Dry run complete, nothing was written");
        } else {
            info!("🎉 Trim complete! Output saved to: {:?}", summary.outputs);
        }
        Ok(summary)
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(TrimmerError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn read_chapters(&self, path: &Path) -> Result<Vec<ChapterMarker>> {
        info!("📖 Reading chapters from {:?}", path);
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;

        let parser = ChapterParser::new(self.config.chapters.exclude_prefix.as_str());
        let markers = parser.parse(&text, &path.display().to_string())?;
        let excluded = markers.iter().filter(|m| m.excluded()).count();
        info!("   {} markers, {} marked for removal", markers.len(), excluded);
        Ok(markers)
    }

    /// Size of the source in bytes; fails early when it is missing
    async fn check_source(&self, source: &Path) -> Result<u64> {
        let metadata = tokio::fs::metadata(source)
            .await
            .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {}", source.display(), e)))?;
        Ok(metadata.len())
    }

    async fn total_size(&self, files: &[PathBuf]) -> Option<u64> {
        let mut total = 0;
        for file in files {
            total += tokio::fs::metadata(file).await.ok()?.len();
        }
        Some(total)
    }

    fn resolve_target(&self, request: &TrimRequest, timeline: &Timeline) -> Result<OutputTarget> {
        let target = match &request.split {
            None => OutputTarget::Joined(
                request
                    .output
                    .clone()
                    .unwrap_or_else(|| default_output_path(&request.source)),
            ),
            Some(split) => {
                let directory = split
                    .directory
                    .clone()
                    .or_else(|| request.output.clone())
                    .unwrap_or_else(|| default_split_directory(&request.source));
                let extension = extension_of(&request.source).unwrap_or(FALLBACK_EXTENSION);
                let files = timeline
                    .kept()
                    .enumerate()
                    .map(|(n, (_, segment))| directory.join(split_file_name(&split.pattern, n + 1, &segment.title, extension)))
                    .collect();
                OutputTarget::Split { directory, files }
            }
        };

        if !request.dry_run && !request.overwrite {
            if let Some(existing) = target.files().into_iter().find(|f| f.exists()) {
                return Err(TrimmerError::OutputExists { path: existing });
            }
        }
        Ok(target)
    }

    /// Where the recalculated chapter list goes, if anywhere
    fn chapter_output(&self, request: &TrimRequest, target: &OutputTarget) -> Result<Option<PathBuf>> {
        let path = match target {
            OutputTarget::Joined(output) if self.config.chapters.generate => chapter_file_path(output),
            _ => return Ok(None),
        };
        if same_file(&path, &request.chapter_file) {
            return Err(TrimmerError::ChapterFileIsInput { path });
        }
        if !request.dry_run && !request.overwrite && path.exists() {
            return Err(TrimmerError::OutputExists { path });
        }
        Ok(Some(path))
    }

    async fn pick_encoder(&self, preference: GpuPreference, probe: &MediaProbe) -> EncoderResolution {
        let mut available = HashSet::new();
        for profile in probe_candidates(preference, self.platform) {
            if self.engine.encoder_available(profile).await {
                available.insert(profile);
                break;
            }
        }
        resolve_encoder(
            preference,
            self.platform,
            &self.config.encoder,
            &probe.streams,
            |profile| available.contains(&profile),
        )
    }

    fn jobs(
        &self,
        directives: Vec<ExtractionDirective>,
        source: &Path,
        target: &OutputTarget,
        scratch_dir: &Path,
    ) -> Vec<ExtractionJob> {
        directives
            .into_iter()
            .enumerate()
            .map(|(position, directive)| {
                let destination = match target {
                    OutputTarget::Joined(output) => {
                        let extension = extension_of(output)
                            .or_else(|| extension_of(source))
                            .unwrap_or(FALLBACK_EXTENSION);
                        artifact_path(scratch_dir, position, extension)
                    }
                    OutputTarget::Split { files, .. } => files[position].clone(),
                };
                ExtractionJob {
                    position,
                    directive,
                    source: source.to_path_buf(),
                    destination,
                    scratch_dir: scratch_dir.to_path_buf(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/videos/show.mkv")),
            PathBuf::from("/videos/show_edited.mkv")
        );
        assert_eq!(
            default_output_path(Path::new("clip")),
            PathBuf::from("clip_edited.mp4")
        );
    }

    #[test]
    fn test_chapter_file_path() {
        assert_eq!(
            chapter_file_path(Path::new("/videos/show_edited.mp4")),
            PathBuf::from("/videos/show_edited.txt")
        );
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Q&A: what/why?"), "Q&A_ what_why_");
        let long = "x".repeat(80);
        assert_eq!(sanitize_title(&long).chars().count(), 50);
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(
            split_file_name(DEFAULT_SPLIT_PATTERN, 3, "Main Content", "mp4"),
            "03 - Main Content.mp4"
        );
        assert_eq!(split_file_name("part{num}", 12, "ignored", "mkv"), "part12.mkv");
    }

    #[test]
    fn test_default_split_directory() {
        assert_eq!(
            default_split_directory(Path::new("/videos/show.mp4")),
            PathBuf::from("/videos/show")
        );
    }

    #[test]
    fn test_same_file_resolves_relative_components() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = dir.path().join("rec.txt");
        std::fs::write(&chapters, "0:00:00.000 A\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        assert!(same_file(&chapters, &dir.path().join("sub").join("..").join("rec.txt")));
        assert!(!same_file(&chapters, &dir.path().join("rec_edited.txt")));
    }
}
