//! Worker metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const CLIPS_TOTAL: &str = "bclip_clips_total";
    pub const CLIP_DURATION_SECONDS: &str = "bclip_clip_duration_seconds";
    pub const THUMBNAILS_TOTAL: &str = "bclip_thumbnails_total";
    pub const TITLES_TOTAL: &str = "bclip_titles_total";
}

/// Record a finished clip by outcome (`completed`, `failed`, `cancelled`).
pub fn record_clip(outcome: &'static str, duration_secs: f64) {
    counter!(names::CLIPS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::CLIP_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

/// Record thumbnail candidates produced and missed.
pub fn record_thumbnails(generated: usize, failed: usize) {
    counter!(names::THUMBNAILS_TOTAL, "outcome" => "generated").increment(generated as u64);
    counter!(names::THUMBNAILS_TOTAL, "outcome" => "failed").increment(failed as u64);
}

/// Record whether a title suggestion replaced the original.
pub fn record_title(replaced: bool) {
    let outcome = if replaced { "generated" } else { "original" };
    counter!(names::TITLES_TOTAL, "outcome" => outcome).increment(1);
}
