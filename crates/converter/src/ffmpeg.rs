use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use crate::chapters::{render_ffmetadata, Chapter};
use crate::config::TranscodeConfig;
use crate::error::EncodeError;
use crate::plan::{ChapterAction, StreamAction, StreamKind, TranscodePlan, VideoAction};
use crate::resolver::metadata_path;

/// Lines of engine output kept for error reports
const DIAGNOSTIC_TAIL_LINES: usize = 40;
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Version reported by `ffmpeg -version` / `ffprobe -version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    /// Parse version from the first line of `-version` output
    /// Example: "ffmpeg version n6.1.1-static" -> ToolVersion { major: 6, minor: 1, patch: 1 }
    pub fn parse(version_line: &str) -> Result<Self> {
        let token = version_line
            .split_whitespace()
            .skip_while(|w| *w != "version")
            .nth(1)
            .ok_or_else(|| anyhow!("No version number found in: {}", version_line))?;

        let numeric: String = token
            .trim_start_matches('n')
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let parts: Vec<&str> = numeric.split('.').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(anyhow!("Invalid version format: {}", version_line));
        }

        let part = |i: usize| -> Result<u32> {
            match parts.get(i) {
                Some(p) => p
                    .parse::<u32>()
                    .with_context(|| format!("Failed to parse version component from: {}", p)),
                None => Ok(0),
            }
        };

        Ok(ToolVersion {
            major: part(0)?,
            minor: part(1)?,
            patch: part(2)?,
        })
    }
}

/// Run `<bin> -version` and return its first line
async fn version_line(bin: &Path) -> Result<String> {
    let output = Command::new(bin)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to execute {}. Is it installed and on PATH?", bin.display()))?;

    if !output.status.success() {
        return Err(anyhow!("{} -version exited with {}", bin.display(), output.status));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(|l| l.to_string())
        .ok_or_else(|| anyhow!("Empty output from {} -version", bin.display()))
}

/// Make sure the external tools can be run before starting a batch.
///
/// The probing tool is always needed; the engine only when converting.
pub async fn preflight(cfg: &TranscodeConfig) -> Result<()> {
    let mut tools = vec![&cfg.ffprobe_bin];
    if !cfg.dry_run {
        tools.push(&cfg.ffmpeg_bin);
    }

    for bin in tools {
        let line = version_line(bin).await?;
        match ToolVersion::parse(&line) {
            Ok(v) => info!("Using {} {}.{}.{}", bin.display(), v.major, v.minor, v.patch),
            // Git snapshots report "N-12345-g..." instead of a release number
            Err(_) => info!("Using {} ({})", bin.display(), line),
        }
    }

    if cfg.dry_run {
        debug!("Dry run: not checking {}", cfg.ffmpeg_bin.display());
    }
    Ok(())
}

/// Build the ffmpeg argument list for a plan.
///
/// Everything is stream-copied by default; per-type codec options are only
/// added where the plan encodes. `chapter_input` is the FFMETADATA file fed
/// as the second input when chapters are replaced.
pub fn build_args(
    plan: &TranscodePlan,
    source: &Path,
    target: &Path,
    chapter_input: Option<&Path>,
    overwrite: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-nostdin".into()];

    // Never clobber existing outputs unless asked to
    args.push(if overwrite { "-y" } else { "-n" }.into());

    // Machine-readable progress on stdout, diagnostics on stderr
    args.extend(["-nostats", "-progress", "pipe:1"].map(OsString::from));

    args.push("-i".into());
    args.push(source.as_os_str().to_owned());

    if let Some(meta) = chapter_input {
        args.extend(["-f", "ffmetadata", "-i"].map(OsString::from));
        args.push(meta.as_os_str().to_owned());
    }

    for selector in &plan.stream_map {
        args.push("-map".into());
        args.push(selector.map_arg().into());
    }

    args.push("-c".into());
    args.push("copy".into());

    if let VideoAction::Encode { codec, quality, scale_to_height } = &plan.video {
        args.extend([
            OsString::from("-c:v"),
            OsString::from(codec),
            OsString::from("-crf"),
            OsString::from(quality.to_string()),
        ]);
        if let Some(height) = scale_to_height {
            // -2 keeps the aspect ratio with an even width
            args.push("-vf".into());
            args.push(format!("scale=-2:{}:flags=lanczos", height).into());
        }
    }

    if let StreamAction::Encode { codec } = &plan.audio {
        args.extend([OsString::from("-c:a"), OsString::from(codec)]);
    }

    if let StreamAction::Encode { codec } = &plan.subtitle {
        args.extend([OsString::from("-c:s"), OsString::from(codec)]);
    }

    match (&plan.chapters, chapter_input) {
        (ChapterAction::Copy, _) => {}
        (_, Some(_)) => args.extend(["-map_chapters", "1"].map(OsString::from)),
        (_, None) => args.extend(["-map_chapters", "-1"].map(OsString::from)),
    }

    if plan.default_first_audio {
        let audio_outputs = plan
            .stream_map
            .iter()
            .filter(|s| s.kind == StreamKind::Audio)
            .count();
        for i in 0..audio_outputs {
            args.push(format!("-disposition:a:{}", i).into());
            args.push(if i == 0 { "default" } else { "0" }.into());
        }
    }

    args.push(target.as_os_str().to_owned());
    args
}

/// Chapters the engine has to be fed from a metadata file, if any
fn chapters_to_write(plan: &TranscodePlan) -> Option<&[Chapter]> {
    match &plan.chapters {
        ChapterAction::Replace(list) if !list.is_empty() => Some(list),
        _ => None,
    }
}

/// Runs the encoding engine for one planned file
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn execute(
        &self,
        plan: &TranscodePlan,
        source: &Path,
        target: &Path,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError>;
}

/// Encoder backed by the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_bin: PathBuf,
    overwrite: bool,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            overwrite,
        }
    }

    pub fn from_config(cfg: &TranscodeConfig) -> Self {
        Self::new(cfg.ffmpeg_bin.clone(), cfg.overwrite)
    }

    /// Human-readable command for logs; non-UTF-8 bytes are replaced
    fn command_line(&self, args: &[OsString]) -> String {
        let shown: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
        format!("{} {}", self.ffmpeg_bin.display(), shown.join(" "))
    }

    async fn run(&self, args: Vec<OsString>, target: &Path, cancel: &CancellationToken) -> Result<(), EncodeError> {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| EncodeError::Spawn {
            tool: self.ffmpeg_bin.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Progress blocks end with a "progress=" line
        let label = target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let progress_handle = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            let mut out_time = String::new();
            let mut speed = String::new();
            let mut last_log = Instant::now();

            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(v) = line.strip_prefix("out_time=") {
                    out_time = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("speed=") {
                    speed = v.trim().to_string();
                } else if let Some(state) = line.strip_prefix("progress=") {
                    if state == "end" || last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                        info!("    ... {}: {} encoded (speed {})", label, out_time, speed);
                        last_log = Instant::now();
                    }
                }
            }
        });

        let stderr_handle = tokio::spawn(async move {
            let mut lines_out = Vec::new();
            let Some(stderr) = stderr else { return lines_out };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("ffmpeg: {}", line);
                lines_out.push(line);
            }
            lines_out
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| EncodeError::Io {
                path: target.to_path_buf(),
                source,
            })?,
            _ = cancel.cancelled() => {
                warn!("Interrupt received, stopping ffmpeg for {}", target.display());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill ffmpeg: {}", e);
                }
                progress_handle.abort();
                stderr_handle.abort();
                return Err(EncodeError::Cancelled(target.to_path_buf()));
            }
        };

        let _ = progress_handle.await;
        let stderr_lines = stderr_handle.await.unwrap_or_default();

        if !status.success() {
            let start = stderr_lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
            return Err(EncodeError::Exit {
                path: target.to_path_buf(),
                code: status.code().unwrap_or(-1),
                output: format!("Command: {}\n{}", self.command_line(&args), stderr_lines[start..].join("\n")),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn execute(
        &self,
        plan: &TranscodePlan,
        source: &Path,
        target: &Path,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError> {
        let meta_path = metadata_path(target);
        let chapter_input = match &plan.chapters {
            ChapterAction::Replace(list) if !list.is_empty() => Some(meta_path.as_path()),
            ChapterAction::DetectScenes { .. } if dry_run => Some(meta_path.as_path()),
            ChapterAction::DetectScenes { .. } => {
                warn!("Scene chapters for {} were never resolved, keeping source chapters", source.display());
                None
            }
            _ => None,
        };

        let args = build_args(plan, source, target, chapter_input, self.overwrite);
        info!("    ... command: {}", self.command_line(&args));

        if dry_run {
            return Ok(());
        }

        let wrote_metadata = match chapters_to_write(plan) {
            Some(chapters) => {
                tokio::fs::write(&meta_path, render_ffmetadata(chapters))
                    .await
                    .map_err(|source| EncodeError::Io { path: meta_path.clone(), source })?;
                true
            }
            None => false,
        };

        let result = self.run(args, target, cancel).await;

        if wrote_metadata {
            if let Err(e) = tokio::fs::remove_file(&meta_path).await {
                warn!("Failed to remove {}: {}", meta_path.display(), e);
            }
        }

        result
    }
}
