//! FFmpeg progress parsing.
//!
//! FFmpeg reports progress in two shapes: `key=value` blocks when run with
//! `-progress pipe:2`, and the classic one-line stats (`frame=… time=…`).
//! Both carry an elapsed output timemark which is read with the shared
//! timestamp parser.

use serde::{Deserialize, Serialize};

use bclip_models::{parse_time_marker, RENDER_PROGRESS_CAP};

/// Keys FFmpeg writes in `-progress` blocks.
const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "stream_0_0_q",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Elapsed output time in seconds
    pub out_time_secs: f64,
    /// Output time as reported (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

/// `min(90, 100 * elapsed / total)`; zero when the total is unknown.
///
/// The percentage is not rescaled into 0..90: 20s of a 40s clip reads 50.
/// The cap only clips the last tenth so the thumbnail phase stays ahead.
pub fn render_percent(elapsed_secs: f64, total_expected_secs: f64) -> f64 {
    if total_expected_secs <= 0.0 || !elapsed_secs.is_finite() {
        return 0.0;
    }
    (100.0 * elapsed_secs.max(0.0) / total_expected_secs).min(RENDER_PROGRESS_CAP)
}

/// True for lines that belong to a `-progress` block.
pub fn is_progress_line(line: &str) -> bool {
    line.split_once('=')
        .is_some_and(|(key, _)| PROGRESS_KEYS.contains(&key.trim()))
}

/// Feed one stderr line into the running progress state.
///
/// Returns a snapshot whenever a complete update is available: at the end of
/// every `-progress` block, or for each classic stats line carrying `time=`.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if line.starts_with("frame=") && line.contains("time=") {
        return parse_stats_line(line, current);
    }

    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    match key.trim() {
        "out_time" => {
            // Reads N/A or a negative value before the first packet.
            if let Ok(secs) = parse_time_marker(value) {
                current.out_time_secs = secs;
                current.out_time = value.to_string();
            }
        }
        "out_time_us" | "out_time_ms" if current.out_time.is_empty() => {
            // Both keys carry microseconds despite the name.
            if let Ok(us) = value.parse::<i64>() {
                if us >= 0 {
                    current.out_time_secs = us as f64 / 1_000_000.0;
                }
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse::<f64>().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// `frame=  120 fps= 60 q=28.0 size=  512kB time=00:00:04.00 bitrate=… speed=2.0x`
fn parse_stats_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let normalized = squeeze_after_equals(line);
    let mut saw_time = false;

    for token in normalized.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "time" => {
                if let Ok(secs) = parse_time_marker(value) {
                    current.out_time_secs = secs;
                    current.out_time = value.to_string();
                    saw_time = true;
                }
            }
            "frame" => current.frame = value.parse().unwrap_or(current.frame),
            "fps" => current.fps = value.parse().unwrap_or(current.fps),
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse::<f64>().ok()) {
                    current.speed = speed;
                }
            }
            _ => {}
        }
    }

    saw_time.then(|| current.clone())
}

/// Values may be separated from their key by padding spaces (`fps= 60`).
fn squeeze_after_equals(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut after_eq = false;
    for c in line.chars() {
        if after_eq && c == ' ' {
            continue;
        }
        after_eq = c == '=';
        out.push(c);
    }
    out
}
