//! Chapter synthesis and FFMETADATA rendering.
//!
//! Chapter times are milliseconds. Every chapter but the last ends one
//! millisecond before the next one starts, the last ends at the duration.

use std::fmt::Write as _;

/// Files up to this long get short chapters
const SHORT_VIDEO_LIMIT_SECS: f64 = 60.0 * 60.0;
const SHORT_CHAPTER_SECS: u64 = 5 * 60;
const LONG_CHAPTER_SECS: u64 = 10 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub start_ms: u64,
    pub end_ms: u64,
    pub title: String,
}

/// Chapter length used for duration-based synthesis
pub fn duration_step_secs(duration_seconds: f64) -> u64 {
    if duration_seconds <= SHORT_VIDEO_LIMIT_SECS {
        SHORT_CHAPTER_SECS
    } else {
        LONG_CHAPTER_SECS
    }
}

/// Partition `[0, duration]` into fixed-length chapters.
///
/// The last chapter starts at the last step boundary before the end and
/// absorbs whatever remains.
pub fn synthesize_by_duration(duration_seconds: f64) -> Vec<Chapter> {
    let total_ms = to_millis(duration_seconds);
    if total_ms == 0 {
        return Vec::new();
    }

    let step_ms = duration_step_secs(duration_seconds) * 1000;
    let starts: Vec<u64> = (0..).map(|i| i * step_ms).take_while(|s| *s < total_ms).collect();
    from_starts(&starts, total_ms)
}

/// Build chapters that begin at each detected scene change.
///
/// The first chapter always starts at zero. Timestamps outside the file or
/// closer than a millisecond to a previous boundary are dropped.
pub fn from_scene_changes(scene_times: &[f64], duration_seconds: f64) -> Vec<Chapter> {
    let total_ms = to_millis(duration_seconds);
    if total_ms == 0 {
        return Vec::new();
    }

    let mut starts = vec![0u64];
    let mut times: Vec<u64> = scene_times
        .iter()
        .filter(|t| t.is_finite())
        .map(|t| to_millis(*t))
        .filter(|ms| *ms > 0 && *ms < total_ms)
        .collect();
    times.sort_unstable();
    times.dedup();
    starts.extend(times);

    from_starts(&starts, total_ms)
}

fn from_starts(starts: &[u64], total_ms: u64) -> Vec<Chapter> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &start_ms)| {
            let end_ms = match starts.get(i + 1) {
                Some(next) => next - 1,
                None => total_ms,
            };
            Chapter {
                start_ms,
                end_ms,
                title: format!("Chapter {}", i + 1),
            }
        })
        .collect()
}

fn to_millis(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

/// Render chapters as an FFMETADATA1 document for `-map_chapters`
pub fn render_ffmetadata(chapters: &[Chapter]) -> String {
    let mut text = String::from(";FFMETADATA1\n");
    for chapter in chapters {
        let _ = write!(
            text,
            "\n[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n",
            chapter.start_ms,
            chapter.end_ms,
            escape_metadata(&chapter.title)
        );
    }
    text
}

fn escape_metadata(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
