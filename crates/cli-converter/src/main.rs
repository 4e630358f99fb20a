use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{Context, Result};
use clap::Parser;
use converter::{
    batch::{BatchResult, FileOutcome},
    config::{ChapterPolicy, TranscodeConfig},
    ffmpeg, BatchRunner, FfmpegEncoder, FfprobeInspector,
};
use humansize::{format_size, DECIMAL};
use log::{error, info, warn};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Batch video converter: mirrors a source tree into a normalized target tree
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory to scan for source files
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Directory that receives converted files
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Comma separated list of source file extensions
    #[arg(long, value_delimiter = ',')]
    formats: Option<Vec<String>>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Actually convert files (the default is a dry run)
    #[arg(long, conflicts_with = "dry_run")]
    convert: bool,

    /// Only log what would be done
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing target files
    #[arg(long)]
    overwrite: bool,

    /// Scale sources below 1080 lines up
    #[arg(long)]
    upscale: bool,

    /// Keep sources above 1080 lines at their height
    #[arg(long)]
    no_downscale: bool,

    /// Chapter handling: copy, remove, duration or scene-detect
    #[arg(long)]
    chapters: Option<ChapterPolicy>,

    /// Scene change threshold for scene-detect chapters, in (0, 1]
    #[arg(long)]
    scene_threshold: Option<f64>,

    /// Output container and file extension
    #[arg(long)]
    container: Option<String>,

    /// Video codec used when re-encoding
    #[arg(long)]
    video_codec: Option<String>,

    /// Constant rate factor for the video encoder
    #[arg(long)]
    quality: Option<u8>,

    /// Audio codec
    #[arg(long)]
    audio_codec: Option<String>,

    /// Subtitle codec
    #[arg(long)]
    subtitle_codec: Option<String>,

    /// Preferred audio language (ISO 639-2)
    #[arg(long)]
    language: Option<String>,

    /// Put audio in the preferred language first and mark it default
    #[arg(long)]
    reorder_audio: bool,

    /// Copy audio and subtitle streams already in the target codec
    #[arg(long)]
    conditional_encode: bool,

    /// Re-probe each output and fail files that lost streams
    #[arg(long)]
    validate: bool,

    /// ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe binary
    #[arg(long)]
    ffprobe: Option<PathBuf>,
}

impl Args {
    /// Command line values win over the config file
    fn apply(self, cfg: &mut TranscodeConfig) {
        if let Some(v) = self.source {
            cfg.source_directory = v;
        }
        if let Some(v) = self.target {
            cfg.target_directory = v;
        }
        if let Some(v) = self.formats {
            cfg.source_formats = v;
        }
        if self.recursive {
            cfg.recursive = true;
        }
        if self.convert {
            cfg.dry_run = false;
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
        if self.overwrite {
            cfg.overwrite = true;
        }
        if self.upscale {
            cfg.upscaling_enabled = true;
        }
        if self.no_downscale {
            cfg.downscaling_enabled = false;
        }
        if let Some(v) = self.chapters {
            cfg.chapter_policy = v;
        }
        if let Some(v) = self.scene_threshold {
            cfg.scene_threshold = v;
        }
        if let Some(v) = self.container {
            cfg.target_container = v;
        }
        if let Some(v) = self.video_codec {
            cfg.target_video_codec = v;
        }
        if let Some(v) = self.quality {
            cfg.target_video_quality = v;
        }
        if let Some(v) = self.audio_codec {
            cfg.target_audio_codec = v;
        }
        if let Some(v) = self.subtitle_codec {
            cfg.target_subtitle_codec = v;
        }
        if let Some(v) = self.language {
            cfg.target_primary_language = v;
        }
        if self.reorder_audio {
            cfg.reorder_audio_by_language = true;
        }
        if self.conditional_encode {
            cfg.conditional_stream_encode = true;
        }
        if self.validate {
            cfg.validate_output = true;
        }
        if let Some(v) = self.ffmpeg {
            cfg.ffmpeg_bin = v;
        }
        if let Some(v) = self.ffprobe {
            cfg.ffprobe_bin = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut cfg = TranscodeConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut cfg);
    cfg.validate().context("Invalid configuration")?;
    let cfg = cfg;

    info!("Video converter starting");
    info!("Configuration:");
    info!("  Source directory: {}", cfg.source_directory.display());
    info!("  Target directory: {}", cfg.target_directory.display());
    info!("  Source formats: {}", cfg.source_formats.join(", "));
    info!("  Recursive: {}", cfg.recursive);
    info!("  Dry run: {}", cfg.dry_run);
    info!("  Overwrite: {}", cfg.overwrite);
    info!("  Upscaling: {}, downscaling: {}", cfg.upscaling_enabled, cfg.downscaling_enabled);
    info!("  Chapters: {}", cfg.chapter_policy);
    info!(
        "  Target: {} / {} crf {} / {} / {}",
        cfg.target_container,
        cfg.target_video_codec,
        cfg.target_video_quality,
        cfg.target_audio_codec,
        cfg.target_subtitle_codec
    );
    if cfg.dry_run {
        info!("Dry run mode: nothing will be written (pass --convert to convert)");
    }

    ffmpeg::preflight(&cfg).await.context("Required tools are not available")?;

    let cancel = CancellationToken::new();
    let watched = cancel.clone();
    tokio::spawn(async move {
        watch_interrupts(next_signal, watched).await;
        std::process::exit(130);
    });

    let mut runner = BatchRunner::new(
        &cfg,
        FfprobeInspector::from_config(&cfg),
        FfmpegEncoder::from_config(&cfg),
        cancel,
    );
    let batch = runner.run().await?;

    print_summary(&batch);

    let summary = batch.summary();
    if summary.failed > 0 || batch.cancelled {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Resolves on the next Ctrl+C or SIGTERM
async fn next_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Cancel the batch on the first signal; return when a second one arrives
async fn watch_interrupts<F, Fut>(mut signals: F, cancel: CancellationToken)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    signals().await;
    warn!("Interrupt received, stopping after cleanup of the current file (interrupt again to exit now)");
    cancel.cancel();

    signals().await;
    error!("Second interrupt received, exiting immediately");
}

fn print_summary(batch: &BatchResult) {
    let summary = batch.summary();

    println!();
    println!("Batch {}", batch.id);
    for record in &batch.records {
        let status = match &record.outcome {
            FileOutcome::Converted => "converted".to_string(),
            FileOutcome::Planned => "planned".to_string(),
            FileOutcome::Skipped { reason } => format!("skipped: {}", reason),
            FileOutcome::Failed { reason } => format!("FAILED: {}", first_line(reason)),
            FileOutcome::Aborted => "aborted".to_string(),
        };
        println!(
            "  {:>8.1}s  {}  [{}]",
            record.elapsed_seconds,
            record.source_path.display(),
            status
        );
    }

    println!();
    println!("Processed:   {}", summary.processed());
    println!("Skipped:     {}", summary.skipped);
    println!("Failed:      {}", summary.failed);
    if batch.cancelled {
        println!("Aborted:     {}", summary.aborted);
        println!("Not started: {}", summary.not_started);
    }
    if summary.converted > 0 {
        println!(
            "Size:        {} -> {}",
            format_size(summary.source_bytes, DECIMAL),
            format_size(summary.target_bytes, DECIMAL)
        );
    }
    println!(
        "Elapsed:     {:.2} seconds [{:.2} minutes]",
        summary.total_elapsed_seconds,
        summary.total_elapsed_seconds / 60.0
    );
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}
