//! Loudness peak detection.
//!
//! Runs the EBU R128 meter over the audio track and prints the momentary
//! loudness of every audio frame; the loudest frame is used as a thumbnail
//! hint.

use std::path::Path;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::command::{FfmpegCommand, FfmpegRunner, StderrSink};
use crate::config::ToolPaths;
use crate::error::{MediaError, MediaResult};
use crate::filters::loudness_meter;

/// Readings at or below the meter's absolute gate count as silence.
const SILENCE_GATE_LUFS: f64 = -70.0;

const PTS_TIME_KEY: &str = "pts_time:";
const MOMENTARY_KEY: &str = "lavfi.r128.M=";

/// Tracks the loudest momentary reading while the meter output streams by.
#[derive(Debug, Default, Clone)]
pub struct PeakTracker {
    current_time: Option<f64>,
    peak: Option<(f64, f64)>,
}

impl PeakTracker {
    /// Time of the loudest reading, if any reading cleared the gate.
    pub fn peak_time(&self) -> Option<f64> {
        self.peak.map(|(time, _)| time)
    }

    /// Loudness of the peak in LUFS.
    pub fn peak_loudness(&self) -> Option<f64> {
        self.peak.map(|(_, loudness)| loudness)
    }

    fn observe(&mut self, loudness: f64) {
        let Some(time) = self.current_time else {
            return;
        };
        if !loudness.is_finite() || loudness <= SILENCE_GATE_LUFS {
            return;
        }
        // Strictly louder, so ties keep the earliest frame.
        if self.peak.map_or(true, |(_, best)| loudness > best) {
            self.peak = Some((time, loudness));
        }
    }
}

impl StderrSink for PeakTracker {
    fn on_line(&mut self, line: &str) {
        if let Some(idx) = line.find(PTS_TIME_KEY) {
            let rest = &line[idx + PTS_TIME_KEY.len()..];
            if let Some(time) = rest.split_whitespace().next().and_then(|t| t.parse::<f64>().ok()) {
                if time.is_finite() && time >= 0.0 {
                    self.current_time = Some(time);
                }
            }
        } else if let Some(idx) = line.find(MOMENTARY_KEY) {
            let value = line[idx + MOMENTARY_KEY.len()..].trim();
            if let Ok(loudness) = value.parse::<f64>() {
                self.observe(loudness);
            }
        }
    }
}

/// Finds the loudest moment of a video's audio track.
#[derive(Debug, Clone)]
pub struct LoudnessLocator {
    tools: ToolPaths,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl LoudnessLocator {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            tools: tools.clone(),
            cancel_rx: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: Option<watch::Receiver<bool>>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    /// Timestamp of the loudest frame in seconds. Falls back to 0 on any
    /// failure, including silent or unreadable input.
    pub async fn find_loudest_timestamp(&self, video_path: impl AsRef<Path>) -> f64 {
        let video_path = video_path.as_ref();
        match self.analyze(video_path).await {
            Ok(tracker) => match tracker.peak_time() {
                Some(time) => {
                    debug!(
                        video = %video_path.display(),
                        time,
                        loudness = tracker.peak_loudness(),
                        "Loudness peak found"
                    );
                    time
                }
                None => {
                    debug!(video = %video_path.display(), "No audible frames, using 0");
                    0.0
                }
            },
            Err(e) => {
                warn!(video = %video_path.display(), error = %e, "Loudness analysis failed, using 0");
                0.0
            }
        }
    }

    /// Run the meter and return the collected readings.
    pub async fn analyze(&self, video_path: &Path) -> MediaResult<PeakTracker> {
        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.to_path_buf()));
        }

        let cmd = FfmpegCommand::new(video_path, "-")
            .no_video()
            .audio_filter(loudness_meter())
            .format("null")
            .log_level("info")
            .without_progress();

        FfmpegRunner::new(&self.tools)
            .with_cancel(self.cancel_rx.clone())
            .run_with_sink(&cmd, PeakTracker::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(lines: &[&str]) -> PeakTracker {
        let mut tracker = PeakTracker::default();
        for line in lines {
            tracker.on_line(line);
        }
        tracker
    }

    #[test]
    fn test_tracks_maximum() {
        let tracker = feed(&[
            "[Parsed_ametadata_1 @ 0x55d] frame:0    pts:0       pts_time:0",
            "[Parsed_ametadata_1 @ 0x55d] lavfi.r128.M=-30.512",
            "[Parsed_ametadata_1 @ 0x55d] frame:1    pts:4800    pts_time:0.1",
            "[Parsed_ametadata_1 @ 0x55d] lavfi.r128.M=-12.004",
            "[Parsed_ametadata_1 @ 0x55d] frame:2    pts:9600    pts_time:0.2",
            "[Parsed_ametadata_1 @ 0x55d] lavfi.r128.M=-18.250",
        ]);
        assert_eq!(tracker.peak_time(), Some(0.1));
        assert_eq!(tracker.peak_loudness(), Some(-12.004));
    }

    #[test]
    fn test_ties_keep_first() {
        let tracker = feed(&[
            "frame:0 pts:0 pts_time:1.5",
            "lavfi.r128.M=-20.0",
            "frame:1 pts:1 pts_time:2.5",
            "lavfi.r128.M=-20.0",
        ]);
        assert_eq!(tracker.peak_time(), Some(1.5));
    }

    #[test]
    fn test_silence_has_no_peak() {
        let tracker = feed(&[
            "frame:0 pts:0 pts_time:0",
            "lavfi.r128.M=-inf",
            "frame:1 pts:1 pts_time:0.1",
            "lavfi.r128.M=-120.7",
            "frame:2 pts:2 pts_time:0.2",
            "lavfi.r128.M=nan",
        ]);
        assert_eq!(tracker.peak_time(), None);
    }

    #[test]
    fn test_reading_before_any_time_is_ignored() {
        let tracker = feed(&["lavfi.r128.M=-5.0", "unrelated noise", "pts_time:garbage"]);
        assert_eq!(tracker.peak_time(), None);
    }

    #[tokio::test]
    async fn test_unreadable_file_returns_zero() {
        let locator = LoudnessLocator::new(&ToolPaths::default());
        assert_eq!(locator.find_loudest_timestamp("/nonexistent/clip.mp4").await, 0.0);
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_returns_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not a video").unwrap();

        let tools = ToolPaths::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let locator = LoudnessLocator::new(&tools);
        assert_eq!(locator.find_loudest_timestamp(&video).await, 0.0);
    }
}
