use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use chapter_trimmer::{
    pipeline::DEFAULT_SPLIT_PATTERN, CancellationToken, Config, ExtractionMode, FfmpegEngine, SplitOptions,
    TrimRequest, Trimmer, TrimmerError,
};

#[derive(Parser)]
#[command(
    name = "chapter-trimmer",
    version,
    about = "Remove chapters from a video without re-encoding the rest",
    long_about = "Chapter-Trimmer reads a chapter list, drops every chapter whose title starts with '--', joins the remaining segments with ffmpeg and writes a chapter list that matches the shorter video."
)]
struct Cli {
    /// Chapter file (one 'H:MM:SS.mmm Title' per line)
    chapter_file: PathBuf,

    /// Source video
    video_file: PathBuf,

    /// Output video (default: <name>_edited.<ext>); the output directory with --split
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Parent directory for intermediate files
    #[arg(short, long)]
    temp_dir: Option<PathBuf>,

    /// Keep intermediate files
    #[arg(short, long)]
    keep_temp: bool,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Show the planned ffmpeg commands without running them
    #[arg(long)]
    dry_run: bool,

    /// Processing mode: copy, accurate or reencode
    #[arg(short, long, conflicts_with_all = ["accurate", "reencode"])]
    mode: Option<ExtractionMode>,

    /// Shorthand for --mode accurate
    #[arg(long, conflicts_with = "reencode")]
    accurate: bool,

    /// Shorthand for --mode reencode
    #[arg(long)]
    reencode: bool,

    /// Hardware encoder: auto, none, videotoolbox, nvenc, qsv or amf
    #[arg(long)]
    gpu: Option<String>,

    /// Do not write a chapter file for the output
    #[arg(long)]
    no_chapters: bool,

    /// Encode with a fixed GOP so the output can be split losslessly later
    #[arg(long)]
    split_safe: bool,

    /// Write each kept chapter to its own file instead of joining them
    #[arg(long)]
    split: bool,

    /// File name pattern for --split ({num}, {title})
    #[arg(long, default_value = DEFAULT_SPLIT_PATTERN)]
    split_pattern: String,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Segments extracted in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,

    /// Pass ffmpeg's own output through
    #[arg(long)]
    show_ffmpeg_output: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(config_path) => {
                info!("Loading configuration from {:?}", config_path);
                Config::from_file(config_path)
                    .with_context(|| format!("loading configuration {:?}", config_path))?
            }
            None => {
                debug!("Using default configuration");
                Config::default()
            }
        };

        // Command line flags override the file
        let mode = match (self.mode, self.accurate, self.reencode) {
            (Some(mode), _, _) => Some(mode),
            (None, true, _) => Some(ExtractionMode::Accurate),
            (None, _, true) => Some(ExtractionMode::Reencode),
            _ => None,
        };
        if let Some(mode) = mode {
            config.extraction.mode = mode.to_string();
        }
        if let Some(gpu) = &self.gpu {
            config.extraction.gpu = gpu.clone();
        }
        if let Some(workers) = self.workers {
            config.extraction.workers = workers;
        }
        if self.no_chapters {
            config.chapters.generate = false;
        }
        if self.split_safe {
            config.encoder.split_safe = true;
        }
        if let Some(temp_dir) = &self.temp_dir {
            config.workspace.temp_dir = Some(temp_dir.clone());
        }
        if self.keep_temp {
            config.workspace.keep_temp = true;
        }
        if self.show_ffmpeg_output {
            config.engine.show_tool_output = true;
        }

        config.validate()?;
        Ok(config)
    }

    fn request(&self) -> TrimRequest {
        let split = self.split.then(|| SplitOptions {
            directory: self.output.clone(),
            pattern: self.split_pattern.clone(),
        });
        TrimRequest {
            chapter_file: self.chapter_file.clone(),
            source: self.video_file.clone(),
            output: if self.split { None } else { self.output.clone() },
            split,
            dry_run: self.dry_run,
            overwrite: self.overwrite,
        }
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, cancel: CancellationToken) -> Result<()> {
    let config = cli.load_config()?;

    let engine = FfmpegEngine::new(config.engine.clone());
    let trimmer = Trimmer::new(config, engine).with_cancellation(cancel);
    let summary = trimmer.run(&cli.request()).await?;

    if cli.quiet {
        if let Some(line) = quiet_summary(summary.warnings.len()) {
            eprintln!("{}", line);
        }
    } else {
        println!("{}", summary);
    }
    Ok(())
}

/// Closing line for `--quiet`; the warnings themselves were already logged
fn quiet_summary(warnings: usize) -> Option<String> {
    match warnings {
        0 => None,
        1 => Some("1 warning (see above)".to_string()),
        n => Some(format!("{} warnings (see above)", n)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    info!("Starting Chapter-Trimmer v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping ffmpeg and cleaning up");
                cancel.cancel();
            }
        });
    }

    match run(&cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<TrimmerError>() {
            Some(trim_error) => {
                eprintln!("error: {}", trim_error.user_message());
                ExitCode::from(trim_error.exit_code())
            }
            None => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "chapter-trimmer",
            "chapters.txt",
            "in.mp4",
            "--accurate",
            "--gpu",
            "auto",
            "--no-chapters",
            "--workers",
            "2",
        ]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.extraction.mode, "accurate");
        assert_eq!(config.extraction.gpu, "auto");
        assert_eq!(config.extraction.workers, 2);
        assert!(!config.chapters.generate);
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["chapter-trimmer", "c.txt", "v.mp4", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_split_request_uses_output_as_directory() {
        let cli = Cli::parse_from(["chapter-trimmer", "c.txt", "v.mp4", "--split", "-o", "parts"]);
        let request = cli.request();
        assert_eq!(request.output, None);
        assert_eq!(request.split.unwrap().directory, Some(PathBuf::from("parts")));
    }

    #[test]
    fn test_quiet_summary_only_counts_warnings() {
        assert_eq!(quiet_summary(0), None);
        assert_eq!(quiet_summary(1).as_deref(), Some("1 warning (see above)"));
        assert_eq!(quiet_summary(3).as_deref(), Some("3 warnings (see above)"));
    }
}
