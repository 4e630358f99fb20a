//! Per-file transcode decisions.
//!
//! [`build_plan`] is pure: it looks only at the probed [`MediaInfo`] and the
//! [`TranscodeConfig`] and never touches the filesystem.

use std::fmt;
use crate::chapters::{self, Chapter};
use crate::config::{ChapterPolicy, TranscodeConfig};
use crate::error::PlanError;
use crate::media::{codec_matches, MediaInfo};

/// Height every scaled output is normalized to
pub const TARGET_HEIGHT: u32 = 1080;

/// What happens to the video streams.
///
/// Scaling only exists inside `Encode`: filtering and stream copy are
/// mutually exclusive in ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoAction {
    Copy,
    Encode {
        codec: String,
        quality: u8,
        scale_to_height: Option<u32>,
    },
}

/// What happens to the audio or subtitle streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAction {
    Copy,
    Encode { codec: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    fn specifier(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
            StreamKind::Subtitle => "s",
        }
    }
}

/// Selects source streams for the output, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSelector {
    pub kind: StreamKind,
    /// Position among the source streams of `kind`; `None` maps all of them
    pub index: Option<usize>,
}

impl StreamSelector {
    pub fn all(kind: StreamKind) -> Self {
        Self { kind, index: None }
    }

    pub fn single(kind: StreamKind, index: usize) -> Self {
        Self { kind, index: Some(index) }
    }

    /// Value for ffmpeg's `-map` option, input 0 being the source
    pub fn map_arg(&self) -> String {
        match self.index {
            // Trailing '?' keeps ffmpeg quiet when the source has none of this type
            None => format!("0:{}?", self.kind.specifier()),
            Some(i) => format!("0:{}:{}", self.kind.specifier(), i),
        }
    }
}

/// Chapter handling resolved for one file
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterAction {
    Copy,
    Remove,
    /// Replace source chapters; an empty list drops them
    Replace(Vec<Chapter>),
    /// Scene detection still has to run before the encode
    DetectScenes { threshold: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodePlan {
    pub video: VideoAction,
    pub audio: StreamAction,
    pub subtitle: StreamAction,
    pub stream_map: Vec<StreamSelector>,
    /// Flag the first mapped audio stream as default and clear the others
    pub default_first_audio: bool,
    pub chapters: ChapterAction,
    pub output_container: String,
}

impl TranscodePlan {
    /// Check the plan's internal invariants.
    ///
    /// A failure here is a defect in [`build_plan`], never a property of the
    /// input file.
    pub fn validate(&self) -> Result<(), PlanError> {
        if let VideoAction::Encode { codec, scale_to_height, .. } = &self.video {
            if codec.trim().is_empty() {
                return Err(PlanError::EmptyCodec("video"));
            }
            if *scale_to_height == Some(0) {
                return Err(PlanError::InvalidScaleHeight);
            }
        }
        if let StreamAction::Encode { codec } = &self.audio {
            if codec.trim().is_empty() {
                return Err(PlanError::EmptyCodec("audio"));
            }
        }
        if let StreamAction::Encode { codec } = &self.subtitle {
            if codec.trim().is_empty() {
                return Err(PlanError::EmptyCodec("subtitle"));
            }
        }
        if self.stream_map.is_empty() {
            return Err(PlanError::EmptyStreamMap);
        }
        Ok(())
    }

    pub fn is_scaling(&self) -> bool {
        matches!(self.video, VideoAction::Encode { scale_to_height: Some(_), .. })
    }

    /// Replace a pending scene detection with the chapters it produced
    pub fn with_chapters(mut self, chapters: Vec<Chapter>) -> Self {
        self.chapters = ChapterAction::Replace(chapters);
        self
    }
}

impl fmt::Display for TranscodePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.video {
            VideoAction::Copy => write!(f, "video=copy")?,
            VideoAction::Encode { codec, quality, scale_to_height: Some(h) } => {
                write!(f, "video={}(crf {}, scale to {}p)", codec, quality, h)?
            }
            VideoAction::Encode { codec, quality, scale_to_height: None } => {
                write!(f, "video={}(crf {})", codec, quality)?
            }
        }
        for (name, action) in [("audio", &self.audio), ("subtitle", &self.subtitle)] {
            match action {
                StreamAction::Copy => write!(f, " {}=copy", name)?,
                StreamAction::Encode { codec } => write!(f, " {}={}", name, codec)?,
            }
        }
        let chapters = match &self.chapters {
            ChapterAction::Copy => "copy".to_string(),
            ChapterAction::Remove => "remove".to_string(),
            ChapterAction::Replace(list) => format!("{} synthesized", list.len()),
            ChapterAction::DetectScenes { threshold } => format!("scene-detect({})", threshold),
        };
        write!(f, " chapters={} container={}", chapters, self.output_container)
    }
}

/// Whether the first video stream has to be rescaled to [`TARGET_HEIGHT`]
pub fn needs_scaling(height: u32, cfg: &TranscodeConfig) -> bool {
    (cfg.upscaling_enabled && height < TARGET_HEIGHT) || (cfg.downscaling_enabled && height > TARGET_HEIGHT)
}

/// Decide how one file is converted
pub fn build_plan(info: &MediaInfo, cfg: &TranscodeConfig) -> TranscodePlan {
    let plan = TranscodePlan {
        video: decide_video(info, cfg),
        audio: decide_stream(
            info.audio_streams.iter().map(|s| s.codec_name.as_str()),
            &cfg.target_audio_codec,
            cfg.conditional_stream_encode,
        ),
        subtitle: decide_stream(
            info.subtitle_streams.iter().map(|s| s.codec_name.as_str()),
            &cfg.target_subtitle_codec,
            cfg.conditional_stream_encode,
        ),
        stream_map: build_stream_map(info, cfg),
        default_first_audio: cfg.reorder_audio_by_language && !info.audio_streams.is_empty(),
        chapters: decide_chapters(info, cfg),
        output_container: cfg.target_container.clone(),
    };
    debug_assert!(plan.validate().is_ok(), "build_plan produced invalid plan: {:?}", plan);
    plan
}

fn decide_video(info: &MediaInfo, cfg: &TranscodeConfig) -> VideoAction {
    let Some(first) = info.first_video() else {
        // Nothing to encode; the optional map selector matches no stream
        return VideoAction::Copy;
    };

    if needs_scaling(first.height, cfg) {
        VideoAction::Encode {
            codec: cfg.target_video_codec.clone(),
            quality: cfg.target_video_quality,
            scale_to_height: Some(TARGET_HEIGHT),
        }
    } else if !codec_matches(&first.codec_name, &cfg.target_video_codec) {
        VideoAction::Encode {
            codec: cfg.target_video_codec.clone(),
            quality: cfg.target_video_quality,
            scale_to_height: None,
        }
    } else {
        VideoAction::Copy
    }
}

fn decide_stream<'a>(
    mut codecs: impl Iterator<Item = &'a str>,
    target: &str,
    conditional: bool,
) -> StreamAction {
    if conditional {
        let mut any = false;
        let all_match = codecs.all(|c| {
            any = true;
            codec_matches(c, target)
        });
        if any && all_match {
            return StreamAction::Copy;
        }
    }
    StreamAction::Encode { codec: target.to_string() }
}

fn build_stream_map(info: &MediaInfo, cfg: &TranscodeConfig) -> Vec<StreamSelector> {
    let mut map = vec![StreamSelector::all(StreamKind::Video)];

    if cfg.reorder_audio_by_language && !info.audio_streams.is_empty() {
        let primary = cfg.target_primary_language.to_ascii_lowercase();
        let (preferred, rest): (Vec<usize>, Vec<usize>) = (0..info.audio_streams.len())
            .partition(|&i| info.audio_streams[i].language.as_deref() == Some(primary.as_str()));
        map.extend(
            preferred
                .into_iter()
                .chain(rest)
                .map(|i| StreamSelector::single(StreamKind::Audio, i)),
        );
    } else {
        map.push(StreamSelector::all(StreamKind::Audio));
    }

    map.push(StreamSelector::all(StreamKind::Subtitle));
    map
}

fn decide_chapters(info: &MediaInfo, cfg: &TranscodeConfig) -> ChapterAction {
    match cfg.chapter_policy {
        ChapterPolicy::Copy => ChapterAction::Copy,
        ChapterPolicy::Remove => ChapterAction::Remove,
        ChapterPolicy::Duration => ChapterAction::Replace(chapters::synthesize_by_duration(info.duration_seconds)),
        ChapterPolicy::SceneDetect => ChapterAction::DetectScenes { threshold: cfg.scene_threshold },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AudioStream, SubtitleStream, VideoStream};
    use proptest::prelude::*;

    fn video_codec() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("h264".to_string()),
            Just("hevc".to_string()),
            Just("mpeg4".to_string()),
            Just("vp9".to_string()),
            Just("mpeg2video".to_string()),
        ]
    }

    fn create_info(codec: &str, width: u32, height: u32) -> MediaInfo {
        MediaInfo {
            container_format: "avi".to_string(),
            duration_seconds: 1800.0,
            video_streams: vec![VideoStream { codec_name: codec.to_string(), width, height }],
            audio_streams: vec![AudioStream { codec_name: "mp3".to_string(), language: None }],
            subtitle_streams: vec![],
            chapter_count: 0,
        }
    }

    fn config(upscaling: bool, downscaling: bool) -> TranscodeConfig {
        TranscodeConfig {
            upscaling_enabled: upscaling,
            downscaling_enabled: downscaling,
            ..TranscodeConfig::default()
        }
    }

    #[test]
    fn matching_1080p_avi_is_copied() {
        let info = create_info("h264", 1920, 1080);
        let plan = build_plan(&info, &config(false, true));

        assert_eq!(plan.video, VideoAction::Copy);
        assert_eq!(plan.audio, StreamAction::Encode { codec: "aac".into() });
        assert_eq!(plan.subtitle, StreamAction::Encode { codec: "srt".into() });
        assert_eq!(plan.output_container, "mkv");
        assert_eq!(plan.chapters, ChapterAction::Copy);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn mismatched_codec_encodes_without_scaling() {
        let plan = build_plan(&create_info("mpeg4", 1920, 1080), &config(false, true));
        assert_eq!(
            plan.video,
            VideoAction::Encode { codec: "h264".into(), quality: 21, scale_to_height: None }
        );
    }

    #[test]
    fn upscaling_forces_encode_even_for_target_codec() {
        let plan = build_plan(&create_info("h264", 1280, 720), &config(true, false));
        assert_eq!(
            plan.video,
            VideoAction::Encode { codec: "h264".into(), quality: 21, scale_to_height: Some(1080) }
        );

        let plan = build_plan(&create_info("h264", 1280, 720), &config(false, true));
        assert_eq!(plan.video, VideoAction::Copy);
    }

    #[test]
    fn no_video_stream_copies_nothing() {
        let mut info = create_info("h264", 1920, 1080);
        info.video_streams.clear();
        let plan = build_plan(&info, &config(true, true));
        assert_eq!(plan.video, VideoAction::Copy);
        assert!(!plan.is_scaling());
    }

    #[test]
    fn only_the_first_video_stream_decides() {
        let mut info = create_info("h264", 1920, 1080);
        info.video_streams.push(VideoStream { codec_name: "mjpeg".into(), width: 3840, height: 2160 });
        let plan = build_plan(&info, &config(false, true));
        assert_eq!(plan.video, VideoAction::Copy);
    }

    #[test]
    fn default_map_takes_every_stream() {
        let plan = build_plan(&create_info("h264", 1920, 1080), &config(false, true));
        let args: Vec<_> = plan.stream_map.iter().map(|s| s.map_arg()).collect();
        assert_eq!(args, vec!["0:v?", "0:a?", "0:s?"]);
        assert!(!plan.default_first_audio);
    }

    #[test]
    fn primary_language_audio_goes_first() {
        let mut info = create_info("h264", 1920, 1080);
        info.audio_streams = vec![
            AudioStream { codec_name: "ac3".into(), language: Some("ger".into()) },
            AudioStream { codec_name: "ac3".into(), language: None },
            AudioStream { codec_name: "dts".into(), language: Some("eng".into()) },
        ];
        let cfg = TranscodeConfig { reorder_audio_by_language: true, ..config(false, true) };
        let plan = build_plan(&info, &cfg);

        let args: Vec<_> = plan.stream_map.iter().map(|s| s.map_arg()).collect();
        assert_eq!(args, vec!["0:v?", "0:a:2", "0:a:0", "0:a:1", "0:s?"]);
        assert!(plan.default_first_audio);
    }

    #[test]
    fn conditional_encode_copies_matching_streams() {
        let mut info = create_info("h264", 1920, 1080);
        info.audio_streams = vec![AudioStream { codec_name: "aac".into(), language: None }];
        info.subtitle_streams = vec![
            SubtitleStream { codec_name: "subrip".into() },
            SubtitleStream { codec_name: "hdmv_pgs_subtitle".into() },
        ];

        let baseline = build_plan(&info, &config(false, true));
        assert_eq!(baseline.audio, StreamAction::Encode { codec: "aac".into() });

        let cfg = TranscodeConfig { conditional_stream_encode: true, ..config(false, true) };
        let plan = build_plan(&info, &cfg);
        assert_eq!(plan.audio, StreamAction::Copy);
        assert_eq!(plan.subtitle, StreamAction::Encode { codec: "srt".into() });
    }

    #[test]
    fn chapter_policies_map_to_actions() {
        let info = create_info("h264", 1920, 1080);

        let remove = TranscodeConfig { chapter_policy: ChapterPolicy::Remove, ..config(false, true) };
        assert_eq!(build_plan(&info, &remove).chapters, ChapterAction::Remove);

        let duration = TranscodeConfig { chapter_policy: ChapterPolicy::Duration, ..config(false, true) };
        match build_plan(&info, &duration).chapters {
            ChapterAction::Replace(list) => assert_eq!(list.len(), 6),
            other => panic!("expected synthesized chapters, got {:?}", other),
        }

        let scenes = TranscodeConfig { chapter_policy: ChapterPolicy::SceneDetect, ..config(false, true) };
        assert_eq!(build_plan(&info, &scenes).chapters, ChapterAction::DetectScenes { threshold: 0.6 });
    }

    #[test]
    fn validate_catches_broken_plans() {
        let mut plan = build_plan(&create_info("mpeg4", 640, 480), &config(true, true));
        plan.video = VideoAction::Encode { codec: "h264".into(), quality: 21, scale_to_height: Some(0) };
        assert_eq!(plan.validate(), Err(PlanError::InvalidScaleHeight));

        plan.video = VideoAction::Copy;
        plan.audio = StreamAction::Encode { codec: " ".into() };
        assert_eq!(plan.validate(), Err(PlanError::EmptyCodec("audio")));

        plan.audio = StreamAction::Copy;
        plan.stream_map.clear();
        assert_eq!(plan.validate(), Err(PlanError::EmptyStreamMap));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Tall sources are always re-encoded down to 1080 when downscaling is on
        #[test]
        fn downscaling_always_encodes(
            codec in video_codec(),
            height in 1081u32..4320,
            upscaling in prop::bool::ANY,
        ) {
            let info = create_info(&codec, height * 16 / 9, height);
            let plan = build_plan(&info, &config(upscaling, true));

            prop_assert_eq!(
                plan.video,
                VideoAction::Encode { codec: "h264".into(), quality: 21, scale_to_height: Some(1080) }
            );
        }

        /// Matching codec without scaling is a stream copy
        #[test]
        fn matching_codec_without_scaling_copies(
            height in 144u32..4320,
            upscaling in prop::bool::ANY,
            downscaling in prop::bool::ANY,
        ) {
            let cfg = config(upscaling, downscaling);
            prop_assume!(!needs_scaling(height, &cfg));

            let plan = build_plan(&create_info("h264", 1920, height), &cfg);
            prop_assert_eq!(plan.video, VideoAction::Copy);
        }

        /// Every built plan satisfies its invariants and scales only when encoding
        #[test]
        fn built_plans_are_valid(
            codec in video_codec(),
            height in 144u32..4320,
            upscaling in prop::bool::ANY,
            downscaling in prop::bool::ANY,
            conditional in prop::bool::ANY,
            reorder in prop::bool::ANY,
        ) {
            let cfg = TranscodeConfig {
                conditional_stream_encode: conditional,
                reorder_audio_by_language: reorder,
                ..config(upscaling, downscaling)
            };
            let plan = build_plan(&create_info(&codec, 1920, height), &cfg);

            prop_assert!(plan.validate().is_ok());
            prop_assert_eq!(plan.is_scaling(), needs_scaling(height, &cfg));
            if needs_scaling(height, &cfg) {
                prop_assert_ne!(plan.video, VideoAction::Copy, "scaled video cannot be stream-copied");
            }
        }
    }
}
