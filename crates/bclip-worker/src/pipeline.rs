//! Clip pipeline: title, render, thumbnails.
//!
//! A clip is produced in one flow. The title suggestion runs next to the
//! render, thumbnails are taken from the finished file, and the whole flow
//! can be cancelled; a cancelled clip is an outcome, not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::Instrument;

use bclip_media::{
    wait_for_cancel, FrameExtractor, LoudnessLocator, MediaError, MediaProbe, RenderJob, Renderer,
};
use bclip_models::encoding::THUMBNAIL_EXTENSION;
use bclip_models::{
    extract_fragment, ClipIdentity, ClipRequest, ProgressEvent, RenderResult, ThumbnailCandidate,
    ThumbnailMode, THUMBNAILS_PROGRESS,
};
use bclip_titles::{suggest_title, TitleGenerator};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ClipLogger;
use crate::metrics;

/// Minimal mode takes its single frame at this share of the clip.
const DEFAULT_FRAME_FRACTION: f64 = 0.3;

/// Rich mode variations, as shares of the rendered clip.
const VARIATION_FRACTIONS: [f64; 4] = [0.2, 0.4, 0.6, 0.8];

/// How a clip request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutcome {
    Completed(RenderResult),
    /// Stopped by the caller; nothing usable was left behind
    Cancelled,
}

impl ClipOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Thumbnail stage result; missing candidates are reported, not raised.
#[derive(Debug, Default)]
struct ThumbnailBatch {
    candidates: Vec<ThumbnailCandidate>,
    failures: Vec<String>,
    cancelled: bool,
}

/// Produces branded clips.
pub struct ClipPipeline {
    config: WorkerConfig,
    renderer: Renderer,
    titles: Arc<dyn TitleGenerator>,
}

impl ClipPipeline {
    /// Create a pipeline with the title generator the configuration selects.
    pub fn new(config: WorkerConfig) -> Self {
        let titles = config.title_generator();
        Self::with_title_generator(config, titles)
    }

    pub fn with_title_generator(config: WorkerConfig, titles: Arc<dyn TitleGenerator>) -> Self {
        let renderer = Renderer::new(&config.tools, config.encoding.clone(), config.canvas)
            .with_timeout(config.render_timeout_secs());
        Self {
            config,
            renderer,
            titles,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Render one branded clip and its thumbnail candidates.
    ///
    /// Progress runs from 0 to 90 while rendering, 91 during thumbnails and
    /// ends at 100 on success. Render failures are fatal; thumbnail failures
    /// only add warnings to the result.
    pub async fn create_clip<F>(
        &self,
        request: &ClipRequest,
        cancel: Option<watch::Receiver<bool>>,
        on_progress: F,
    ) -> WorkerResult<ClipOutcome>
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        request.validate()?;

        let identity = ClipIdentity::for_request(request);
        let logger = ClipLogger::new(&identity, "create_clip");
        let span = logger.create_span();

        let started = Instant::now();
        let result = self
            .run_clip(request, &identity, &logger, cancel, Arc::new(on_progress))
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(ClipOutcome::Completed(_)) => "completed",
            Ok(ClipOutcome::Cancelled) => "cancelled",
            Err(_) => "failed",
        };
        metrics::record_clip(outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn run_clip<F>(
        &self,
        request: &ClipRequest,
        identity: &ClipIdentity,
        logger: &ClipLogger,
        cancel: Option<watch::Receiver<bool>>,
        on_progress: Arc<F>,
    ) -> WorkerResult<ClipOutcome>
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        let output = self.config.clip_path(identity);
        let thumb_dir = self.config.thumbnail_dir(identity);
        reset_dir(&thumb_dir).await?;

        logger.log_start(&format!(
            "{} [{:.2}s - {:.2}s] -> {}",
            request.source_video_id,
            request.start_time,
            request.end_time,
            output.display()
        ));
        on_progress(ProgressEvent::new(0.0, "Starting clip"));

        let job = RenderJob {
            intro: self.config.intro_path.clone(),
            source: self.config.source_path(&request.source_video_id),
            ending: self.config.ending_path.clone(),
            start_time: request.start_time,
            duration: request.duration(),
            output: output.clone(),
        };

        let progress = on_progress.clone();
        let (generated_title, rendered) = tokio::join!(
            self.generate_title(request, cancel.clone()),
            self.renderer.render(&job, cancel.clone(), move |event| progress(event)),
        );

        let report = match rendered {
            Ok(report) => report,
            Err(MediaError::Cancelled) => {
                logger.log_warning("cancelled during render");
                remove_dir_quietly(&thumb_dir).await;
                return Ok(ClipOutcome::Cancelled);
            }
            Err(e) => {
                logger.log_error(&format!("render failed: {}", e));
                remove_dir_quietly(&thumb_dir).await;
                return Err(WorkerError::Render(e));
            }
        };

        logger.log_progress(&format!("rendered in {:.1}s", report.encode_secs));
        on_progress(ProgressEvent::new(THUMBNAILS_PROGRESS, "Generating thumbnails"));

        let thumbnails = self
            .generate_thumbnails(&output, report.total_expected_secs, &thumb_dir, cancel.clone())
            .await;

        if thumbnails.cancelled || is_cancelled(&cancel) {
            logger.log_warning("cancelled during thumbnails");
            let _ = tokio::fs::remove_file(&output).await;
            remove_dir_quietly(&thumb_dir).await;
            return Ok(ClipOutcome::Cancelled);
        }

        metrics::record_thumbnails(thumbnails.candidates.len(), thumbnails.failures.len());

        let mut warnings = thumbnails.failures;
        if thumbnails.candidates.is_empty() {
            warnings.push("No thumbnail candidates could be generated".to_string());
        }
        for warning in &warnings {
            logger.log_warning(warning);
        }

        on_progress(ProgressEvent::done());
        logger.log_completion(&format!(
            "{} thumbnail(s), title {}",
            thumbnails.candidates.len(),
            if generated_title.is_some() { "generated" } else { "unchanged" }
        ));

        Ok(ClipOutcome::Completed(RenderResult {
            rendered_video_path: output,
            clip_id: identity.clone(),
            generated_thumbnails: thumbnails.candidates,
            generated_title,
            warnings,
        }))
    }

    /// Suggested title for a request with a transcript; `None` when there is
    /// nothing to suggest or the service kept the original.
    async fn generate_title(&self, request: &ClipRequest, cancel: Option<watch::Receiver<bool>>) -> Option<String> {
        let transcript = request.transcript.as_deref()?;
        let fragment = extract_fragment(transcript, request.start_time, request.end_time);
        if fragment.is_empty() {
            return None;
        }

        let title = tokio::select! {
            title = suggest_title(self.titles.as_ref(), &fragment, &request.title) => title,
            _ = wait_for_cancel(cancel) => return None,
        };

        let replaced = title != request.title;
        metrics::record_title(replaced);
        replaced.then_some(title)
    }

    /// Suggest a new title for a clip window without rendering anything.
    pub async fn reroll_title(&self, transcript: &str, start_time: f64, end_time: f64, original_title: &str) -> String {
        let fragment = extract_fragment(transcript, start_time, end_time);
        if fragment.is_empty() {
            return original_title.to_string();
        }
        suggest_title(self.titles.as_ref(), &fragment, original_title).await
    }

    async fn generate_thumbnails(
        &self,
        video: &Path,
        total_expected: f64,
        dir: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> ThumbnailBatch {
        let extractor = FrameExtractor::new(&self.config.tools).with_cancel(cancel.clone());

        let results = match self.config.thumbnail_mode {
            ThumbnailMode::Minimal => {
                let at = total_expected * DEFAULT_FRAME_FRACTION;
                vec![extract_candidate(&extractor, video, "default", at, thumbnail_path(dir, 0)).await]
            }
            ThumbnailMode::Rich => {
                let probe = MediaProbe::new(&self.config.tools);
                let probed = tokio::select! {
                    probed = probe.duration(video) => probed,
                    _ = wait_for_cancel(cancel.clone()) => {
                        return ThumbnailBatch {
                            cancelled: true,
                            ..Default::default()
                        }
                    }
                };
                let duration = probed.unwrap_or(total_expected);

                let locator = LoudnessLocator::new(&self.config.tools).with_cancel(cancel.clone());
                let peak = async {
                    let at = locator.find_loudest_timestamp(video).await.min(duration);
                    extract_candidate(&extractor, video, "peak", at, thumbnail_path(dir, 0)).await
                };

                let variations = VARIATION_FRACTIONS.iter().enumerate().map(|(i, fraction)| {
                    let label = format!("v{}", i + 1);
                    let path = thumbnail_path(dir, i + 1);
                    let extractor = &extractor;
                    async move { extract_candidate(extractor, video, &label, duration * fraction, path).await }
                });

                let (peak, variations) = tokio::join!(peak, join_all(variations));
                std::iter::once(peak).chain(variations).collect()
            }
        };

        let mut batch = ThumbnailBatch::default();
        for result in results {
            match result {
                Ok(candidate) => batch.candidates.push(candidate),
                Err((_, MediaError::Cancelled)) => batch.cancelled = true,
                Err((label, e)) => batch.failures.push(format!("Thumbnail '{}' failed: {}", label, e)),
            }
        }
        batch
    }

    /// Extract a frame of a rendered clip at a user-chosen time.
    pub async fn capture_frame(&self, identity: &ClipIdentity, timestamp: f64) -> WorkerResult<ThumbnailCandidate> {
        let video = self.config.clip_path(identity);
        let path = self
            .config
            .thumbnail_dir(identity)
            .join(format!("thumb-custom.{}", THUMBNAIL_EXTENSION));

        FrameExtractor::new(&self.config.tools)
            .extract_frame(&video, timestamp, &path)
            .await
            .map_err(|e| WorkerError::thumbnails(e.to_string()))?;

        Ok(ThumbnailCandidate {
            label: "custom".to_string(),
            timestamp_seconds: timestamp,
            file_path: path,
        })
    }

    /// Small JPEG of a rendered clip at `timestamp`, for scrubbing.
    pub async fn preview_frame(&self, identity: &ClipIdentity, timestamp: f64) -> WorkerResult<Vec<u8>> {
        let video = self.config.clip_path(identity);
        FrameExtractor::new(&self.config.tools)
            .preview_frame(&video, timestamp)
            .await
            .map_err(|e| WorkerError::thumbnails(e.to_string()))
    }
}

async fn extract_candidate(
    extractor: &FrameExtractor,
    video: &Path,
    label: &str,
    timestamp: f64,
    path: PathBuf,
) -> Result<ThumbnailCandidate, (String, MediaError)> {
    match extractor.extract_frame(video, timestamp, &path).await {
        Ok(()) => Ok(ThumbnailCandidate {
            label: label.to_string(),
            timestamp_seconds: timestamp,
            file_path: path,
        }),
        Err(e) => Err((label.to_string(), e)),
    }
}

fn thumbnail_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("thumb-{}.{}", index, THUMBNAIL_EXTENSION))
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Start a clip with an empty thumbnail directory.
async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

async fn remove_dir_quietly(dir: &Path) {
    let _ = tokio::fs::remove_dir_all(dir).await;
}
