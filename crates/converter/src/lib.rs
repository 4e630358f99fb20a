pub mod config;
pub mod error;
pub mod media;
pub mod ffprobe;
pub mod chapters;
pub mod plan;
pub mod resolver;
pub mod scan;
pub mod ffmpeg;
pub mod verify;
pub mod batch;

pub use config::{ChapterPolicy, TranscodeConfig};
pub use error::{EncodeError, FsError, PlanError, ProbeError};
pub use media::MediaInfo;
pub use ffprobe::{FfprobeInspector, Inspector};
pub use ffmpeg::{Encoder, FfmpegEncoder};
pub use plan::{build_plan, TranscodePlan};
pub use batch::{BatchResult, BatchRunner, BatchSummary, FileOutcome};
