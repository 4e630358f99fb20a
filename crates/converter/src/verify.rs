use crate::media::MediaInfo;

/// Allowed difference between source and output duration before warning
const DURATION_TOLERANCE_SECS: f64 = 2.0;

/// Validation result for output file
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

/// Compare a converted file against its source.
///
/// The output must still carry video, and audio whenever the source had
/// audio. A duration mismatch is only a warning.
pub fn validate_output(source: &MediaInfo, output: &MediaInfo) -> ValidationResult {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if output.video_streams.is_empty() && !source.video_streams.is_empty() {
        issues.push("output has no video stream".to_string());
    }

    if output.audio_streams.is_empty() && !source.audio_streams.is_empty() {
        issues.push("output has no audio stream".to_string());
    }

    if output.subtitle_streams.len() < source.subtitle_streams.len() {
        warnings.push(format!(
            "output has {} subtitle stream(s), source had {}",
            output.subtitle_streams.len(),
            source.subtitle_streams.len()
        ));
    }

    if source.duration_seconds > 0.0
        && (source.duration_seconds - output.duration_seconds).abs() > DURATION_TOLERANCE_SECS
    {
        warnings.push(format!(
            "duration changed from {:.1}s to {:.1}s",
            source.duration_seconds, output.duration_seconds
        ));
    }

    ValidationResult {
        is_valid: issues.is_empty(),
        issues,
        warnings,
    }
}
