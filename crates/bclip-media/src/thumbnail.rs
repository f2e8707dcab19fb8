//! Still frame extraction.

use std::path::Path;

use tokio::sync::watch;
use tracing::debug;

use bclip_models::encoding::{PREVIEW_QUALITY, PREVIEW_WIDTH, THUMBNAIL_QUALITY};

use crate::command::{wait_for_cancel, FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::config::ToolPaths;
use crate::error::{MediaError, MediaResult};
use crate::filters::filter_preview;
use crate::probe::MediaProbe;

/// Grabs single frames out of a finished video.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    tools: ToolPaths,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FrameExtractor {
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

    /// Write the frame at `timestamp` to `output_path` as a high quality JPEG,
    /// replacing any existing file.
    pub async fn extract_frame(
        &self,
        video_path: impl AsRef<Path>,
        timestamp: f64,
        output_path: impl AsRef<Path>,
    ) -> MediaResult<()> {
        let video_path = video_path.as_ref();
        let output_path = output_path.as_ref();

        let probe = MediaProbe::new(&self.tools);
        let duration = tokio::select! {
            duration = probe.duration(video_path) => duration?,
            _ = wait_for_cancel(self.cancel_rx.clone()) => return Err(MediaError::Cancelled),
        };
        if !timestamp.is_finite() || timestamp < 0.0 || timestamp > duration {
            return Err(MediaError::TimestampOutOfRange { timestamp, duration });
        }

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            video = %video_path.display(),
            output = %output_path.display(),
            timestamp,
            "Extracting frame"
        );

        let cmd = FfmpegCommand::new(video_path, output_path)
            .seek(timestamp)
            .single_frame()
            .image_quality(THUMBNAIL_QUALITY)
            .without_progress();

        self.runner().run(&cmd).await?;

        // Seeking onto the very last timestamp can decode nothing and still exit 0.
        if !output_path.exists() {
            return Err(MediaError::ffmpeg_failed(
                format!("No frame decoded at {:.3}s", timestamp),
                None,
                Some(0),
            ));
        }

        Ok(())
    }

    /// Small low-quality JPEG of the frame at `timestamp`, returned in memory.
    pub async fn preview_frame(&self, video_path: impl AsRef<Path>, timestamp: f64) -> MediaResult<Vec<u8>> {
        let video_path = video_path.as_ref();
        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.to_path_buf()));
        }

        let cmd = FfmpegCommand::to_output("-")
            .input(FfmpegInput::new(video_path).seek(timestamp.max(0.0)))
            .single_frame()
            .video_filter(filter_preview(PREVIEW_WIDTH))
            .image_quality(PREVIEW_QUALITY)
            .format("mjpeg")
            .without_progress();

        let bytes = self.runner().run_capture(&cmd).await?;
        if bytes.is_empty() {
            return Err(MediaError::ffmpeg_failed(
                format!("No preview frame at {:.3}s", timestamp),
                None,
                Some(0),
            ));
        }
        Ok(bytes)
    }

    fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new(&self.tools).with_cancel(self.cancel_rx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreadable_source() {
        let extractor = FrameExtractor::new(&ToolPaths::default());
        let result = extractor
            .extract_frame("/nonexistent/video.mp4", 1.0, "/tmp/never.jpg")
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));

        let preview = extractor.preview_frame("/nonexistent/video.mp4", 1.0).await;
        assert!(matches!(preview, Err(MediaError::FileNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_while_probing() {
        let dir = tempfile::TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"clip").unwrap();
        let ffprobe = crate::testing::fake_tool(dir.path(), "ffprobe", "exec sleep 30");

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let extractor = FrameExtractor::new(&ToolPaths::new(dir.path().join("no-ffmpeg"), ffprobe))
            .with_cancel(Some(rx));
        let started = std::time::Instant::now();
        let result = extractor.extract_frame(&video, 1.0, dir.path().join("thumb.jpg")).await;
        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timestamp_past_the_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"clip").unwrap();
        let ffprobe = crate::testing::fake_ffprobe(dir.path(), 5.0, 20.0);

        let extractor = FrameExtractor::new(&ToolPaths::new(dir.path().join("no-ffmpeg"), ffprobe));
        let result = extractor.extract_frame(&video, 25.0, dir.path().join("thumb.jpg")).await;
        assert!(matches!(
            result,
            Err(MediaError::TimestampOutOfRange { timestamp, duration }) if timestamp == 25.0 && duration == 20.0
        ));
    }

    #[test]
    fn test_preview_command() {
        let cmd = FfmpegCommand::to_output("-")
            .input(FfmpegInput::new("clip.mp4").seek(2.5))
            .single_frame()
            .video_filter(filter_preview(PREVIEW_WIDTH))
            .format("mjpeg")
            .without_progress();
        let args = cmd.build_args().join(" ");
        assert!(args.contains("-ss 2.500 -i clip.mp4"));
        assert!(args.contains("-vf scale=160:-2"));
        assert!(args.ends_with("-f mjpeg -"));
    }
}
