use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain media metadata for a file. The batch skips the file.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffprobe exited with code {code} for {path}: {stderr}")]
    Exit {
        path: PathBuf,
        code: i32,
        stderr: String,
    },

    #[error("failed to parse ffprobe output for {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unusable ffprobe output for {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("probe of {0} was cancelled")]
    Cancelled(PathBuf),
}

/// Failure while running the encoding engine. The batch marks the file failed.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with code {code} for {path}\n{output}")]
    Exit {
        path: PathBuf,
        code: i32,
        output: String,
    },

    #[error("encode of {0} was cancelled")]
    Cancelled(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invariant violation inside the plan builder. Always a defect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("scale target height must be positive")]
    InvalidScaleHeight,

    #[error("{0} encode requested without a codec")]
    EmptyCodec(&'static str),

    #[error("stream map is empty")]
    EmptyStreamMap,
}

/// Target tree could not be prepared. Fatal for the affected file only.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{source_path} is not under source root {root}")]
    OutsideRoot { source_path: PathBuf, root: PathBuf },
}
