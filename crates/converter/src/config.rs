use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use log::warn;

/// Chapter handling policy for the output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChapterPolicy {
    /// Keep whatever chapters the source carries
    #[default]
    Copy,
    /// Strip all chapters
    Remove,
    /// Synthesize fixed-length chapters from the duration
    Duration,
    /// Synthesize chapters at detected scene changes
    SceneDetect,
}

impl FromStr for ChapterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(ChapterPolicy::Copy),
            "remove" => Ok(ChapterPolicy::Remove),
            "duration" => Ok(ChapterPolicy::Duration),
            "scene-detect" | "detect-scenes" | "scene" => Ok(ChapterPolicy::SceneDetect),
            other => Err(format!(
                "unknown chapter policy '{}' (expected copy, remove, duration or scene-detect)",
                other
            )),
        }
    }
}

impl fmt::Display for ChapterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChapterPolicy::Copy => "copy",
            ChapterPolicy::Remove => "remove",
            ChapterPolicy::Duration => "duration",
            ChapterPolicy::SceneDetect => "scene-detect",
        };
        f.write_str(name)
    }
}

/// Configuration for a batch conversion run.
///
/// Built once at startup (defaults, then file, then command line) and never
/// mutated afterwards. Components receive it by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Root of the tree to scan for media files
    pub source_directory: PathBuf,
    /// Root of the mirrored output tree
    pub target_directory: PathBuf,
    /// File extensions (without dot, case-insensitive) considered video sources
    pub source_formats: Vec<String>,
    /// Descend into subdirectories of the source root
    pub recursive: bool,
    /// Log what would be done without touching the filesystem or running ffmpeg
    pub dry_run: bool,
    /// Allow ffmpeg to replace existing output files
    pub overwrite: bool,
    /// Scale sources shorter than 1080 lines up to 1080
    pub upscaling_enabled: bool,
    /// Scale sources taller than 1080 lines down to 1080
    pub downscaling_enabled: bool,
    pub chapter_policy: ChapterPolicy,
    /// Similarity threshold for the scene-change filter (0, 1]
    pub scene_threshold: f64,
    /// Output container, also used as the output file extension
    pub target_container: String,
    pub target_video_codec: String,
    /// Constant rate factor passed to the video encoder
    pub target_video_quality: u8,
    pub target_audio_codec: String,
    pub target_subtitle_codec: String,
    /// ISO 639-2 language code preferred for the first audio track
    pub target_primary_language: String,
    /// Put audio streams in the primary language first and mark it default
    pub reorder_audio_by_language: bool,
    /// Copy audio/subtitle streams that already use the target codec
    pub conditional_stream_encode: bool,
    /// Re-probe every output after encoding and fail files that look broken
    pub validate_output: bool,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl TranscodeConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            source_directory: PathBuf::from("."),
            target_directory: PathBuf::from("./converted"),
            source_formats: [
                "mkv", "divx", "mp4", "m4p", "m4v", "mov", "qt", "ogg", "avi", "mpg", "wmv",
                "flv", "m2ts", "mpeg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            recursive: false,
            dry_run: true,
            overwrite: false,
            upscaling_enabled: false,
            downscaling_enabled: true,
            chapter_policy: ChapterPolicy::Copy,
            scene_threshold: 0.6,
            target_container: "mkv".to_string(),
            target_video_codec: "h264".to_string(),
            target_video_quality: 21,
            target_audio_codec: "aac".to_string(),
            target_subtitle_codec: "srt".to_string(),
            target_primary_language: "eng".to_string(),
            reorder_audio_by_language: false,
            conditional_stream_encode: false,
            validate_output: false,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // Try JSON first, then TOML
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            } else {
                warn!("Config file {} not found, using defaults", config_path.display());
            }
        }

        Ok(config)
    }

    /// Check the configuration for values that would make a run meaningless or destructive
    pub fn validate(&self) -> Result<()> {
        if !self.source_directory.is_dir() {
            bail!("Source directory does not exist or is not a directory: {}", self.source_directory.display());
        }

        if normalize(&self.source_directory) == normalize(&self.target_directory) {
            bail!(
                "Target directory must differ from source directory ({})",
                self.source_directory.display()
            );
        }

        if self.source_formats.iter().all(|f| f.trim().is_empty()) {
            bail!("No source formats configured");
        }

        for (name, value) in [
            ("target_container", &self.target_container),
            ("target_video_codec", &self.target_video_codec),
            ("target_audio_codec", &self.target_audio_codec),
            ("target_subtitle_codec", &self.target_subtitle_codec),
        ] {
            if value.trim().is_empty() {
                bail!("{} must not be empty", name);
            }
        }

        if !(self.scene_threshold > 0.0 && self.scene_threshold <= 1.0) {
            bail!("scene_threshold must be in (0, 1], got {}", self.scene_threshold);
        }

        if self.recursive && normalize(&self.target_directory).starts_with(normalize(&self.source_directory)) {
            warn!(
                "Target directory {} is inside the recursively scanned source {}; outputs of earlier runs will be picked up as sources",
                self.target_directory.display(),
                self.source_directory.display()
            );
        }

        Ok(())
    }

    /// Whether `ext` (without the dot) is one of the configured source formats
    pub fn is_source_format(&self, ext: &str) -> bool {
        self.source_formats
            .iter()
            .any(|f| f.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
