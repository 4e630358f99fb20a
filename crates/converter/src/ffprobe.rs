use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use crate::config::TranscodeConfig;
use crate::error::ProbeError;
use crate::media::{AudioStream, MediaInfo, SubtitleStream, VideoStream};

/// Complete ffprobe output structure
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
    #[serde(default)]
    pub chapters: Vec<FFProbeChapter>,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeChapter {
    pub id: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FFProbeFrames {
    #[serde(default)]
    frames: Vec<FFProbeFrame>,
}

#[derive(Debug, Clone, Deserialize)]
struct FFProbeFrame {
    pts_time: Option<String>,
    best_effort_timestamp_time: Option<String>,
}

impl FFProbeStream {
    /// Language tag of the stream, ignoring the `und` placeholder
    fn language(&self) -> Option<String> {
        self.tags
            .as_ref()
            .and_then(|t| t.get("language"))
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty() && l != "und")
    }
}

impl FFProbeData {
    /// Convert raw ffprobe output into the typed model.
    ///
    /// Streams are classified by `codec_type`; types other than video, audio
    /// and subtitle (data, attachment) are ignored.
    pub fn into_media_info(self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let format = self.format.ok_or_else(|| ProbeError::Malformed {
            path: path.to_path_buf(),
            reason: "no format section".to_string(),
        })?;

        let duration_seconds = format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(0.0);

        let mut info = MediaInfo {
            container_format: format.format_name.unwrap_or_default(),
            duration_seconds,
            chapter_count: self.chapters.len(),
            ..MediaInfo::default()
        };

        for stream in self.streams {
            let codec_name = stream.codec_name.clone().unwrap_or_default();
            match stream.codec_type.as_deref() {
                Some("video") => {
                    let (width, height) = match (stream.width, stream.height) {
                        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
                        _ => {
                            return Err(ProbeError::Malformed {
                                path: path.to_path_buf(),
                                reason: format!("video stream {} has no dimensions", stream.index),
                            })
                        }
                    };
                    info.video_streams.push(VideoStream { codec_name, width, height });
                }
                Some("audio") => {
                    let language = stream.language();
                    info.audio_streams.push(AudioStream { codec_name, language });
                }
                Some("subtitle") => {
                    info.subtitle_streams.push(SubtitleStream { codec_name });
                }
                other => {
                    debug!("Ignoring stream {} of type {:?} in {}", stream.index, other, path.display());
                }
            }
        }

        Ok(info)
    }
}

/// Parse the JSON printed by `ffprobe -print_format json`
pub fn parse_probe_output(path: &Path, json: &[u8]) -> Result<MediaInfo, ProbeError> {
    let data: FFProbeData = serde_json::from_slice(json).map_err(|source| ProbeError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    data.into_media_info(path)
}

/// Parse frame timestamps from a scene-change probe
pub fn parse_scene_frames(path: &Path, json: &[u8]) -> Result<Vec<f64>, ProbeError> {
    let data: FFProbeFrames = serde_json::from_slice(json).map_err(|source| ProbeError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut times: Vec<f64> = data
        .frames
        .iter()
        .filter_map(|f| f.pts_time.as_deref().or(f.best_effort_timestamp_time.as_deref()))
        .filter_map(|t| t.trim().parse::<f64>().ok())
        .filter(|t| t.is_finite() && *t > 0.0)
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup();
    Ok(times)
}

/// Escape a path for use as the `movie` source inside a filtergraph.
///
/// Two levels apply: the option value, then the graph description. Only
/// ASCII bytes are escaped, so non-UTF-8 names pass through unchanged.
pub fn escape_filter_path(path: &Path) -> OsString {
    let option_level = escape_bytes(&path_bytes(path), b"\\':");
    let graph_level = escape_bytes(&option_level, b"\\',;[]");
    bytes_to_os(graph_level)
}

fn escape_bytes(raw: &[u8], special: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &b in raw {
        if special.contains(&b) {
            out.push(b'\\');
        }
        out.push(b);
    }
    out
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    Cow::Owned(path.to_string_lossy().into_owned().into_bytes())
}

#[cfg(unix)]
fn bytes_to_os(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
fn bytes_to_os(bytes: Vec<u8>) -> OsString {
    String::from_utf8_lossy(&bytes).into_owned().into()
}

/// Reads stream layout and scene changes of source files
#[async_trait]
pub trait Inspector: Send + Sync {
    async fn inspect(&self, path: &Path, cancel: &CancellationToken) -> Result<MediaInfo, ProbeError>;

    /// Timestamps (seconds) of frames whose scene score exceeds `threshold`
    async fn scene_changes(
        &self,
        path: &Path,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<f64>, ProbeError>;
}

/// Inspector backed by the ffprobe binary
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    ffprobe_bin: PathBuf,
}

impl FfprobeInspector {
    pub fn new(ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self { ffprobe_bin: ffprobe_bin.into() }
    }

    pub fn from_config(cfg: &TranscodeConfig) -> Self {
        Self::new(cfg.ffprobe_bin.clone())
    }

    async fn run(&self, path: &Path, args: Vec<OsString>, cancel: &CancellationToken) -> Result<Vec<u8>, ProbeError> {
        let shown: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
        debug!("ffprobe command: {} {}", self.ffprobe_bin.display(), shown.join(" "));

        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future kills the child
        let output = tokio::select! {
            output = cmd.output() => output.map_err(|source| ProbeError::Spawn {
                tool: self.ffprobe_bin.display().to_string(),
                source,
            })?,
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled(path.to_path_buf())),
        };

        if !output.status.success() {
            return Err(ProbeError::Exit {
                path: path.to_path_buf(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Inspector for FfprobeInspector {
    async fn inspect(&self, path: &Path, cancel: &CancellationToken) -> Result<MediaInfo, ProbeError> {
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_chapters",
            "-show_format",
            "-show_streams",
        ]
        .map(OsString::from)
        .to_vec();
        args.push(path.as_os_str().to_owned());

        let stdout = self.run(path, args, cancel).await?;
        parse_probe_output(path, &stdout)
    }

    async fn scene_changes(
        &self,
        path: &Path,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<f64>, ProbeError> {
        let mut graph = OsString::from("movie=");
        graph.push(escape_filter_path(path));
        graph.push(format!(",select=gt(scene\\,{})", threshold));

        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_entries",
            "frame=pts_time,best_effort_timestamp_time",
            "-f",
            "lavfi",
        ]
        .map(OsString::from)
        .to_vec();
        args.push(graph);

        let stdout = self.run(path, args, cancel).await?;
        let times = parse_scene_frames(path, &stdout)?;
        if times.is_empty() {
            warn!("No scene changes above {} detected in {}", threshold, path.display());
        }
        Ok(times)
    }
}
