//! Typed media metadata as reported by the probing tool.

/// Normalized description of one source file.
///
/// Streams keep the order the probing tool reported them in; plan decisions
/// that look at "the first video stream" rely on that.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaInfo {
    pub container_format: String,
    pub duration_seconds: f64,
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
    pub subtitle_streams: Vec<SubtitleStream>,
    pub chapter_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStream {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    pub codec_name: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleStream {
    pub codec_name: String,
}

impl MediaInfo {
    pub fn first_video(&self) -> Option<&VideoStream> {
        self.video_streams.first()
    }
}

/// Compare codec names the way ffprobe and ffmpeg spell them.
///
/// ffprobe reports `subrip` for what the encoder calls `srt`, and `hevc`
/// for `h265`.
pub fn codec_matches(a: &str, b: &str) -> bool {
    canonical_codec(a) == canonical_codec(b)
}

fn canonical_codec(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "srt" => "subrip".to_string(),
        "h265" => "hevc".to_string(),
        "avc" => "h264".to_string(),
        _ => lower,
    }
}
