//! Sequential batch processing with an event stream.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use bclip_models::{BatchEvent, BatchRequest};

use crate::error::WorkerResult;
use crate::pipeline::{ClipOutcome, ClipPipeline};

/// Totals reported at the end of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Process every clip of a batch in order, one at a time.
///
/// A clip that fails is reported and the batch moves on; a cancellation
/// stops the batch. `clip-complete` of clip N is always emitted before
/// `clip-start` of clip N+1, and `all-complete` is always the last event.
pub async fn run_batch<S>(
    pipeline: &ClipPipeline,
    request: &BatchRequest,
    cancel: Option<watch::Receiver<bool>>,
    sink: S,
) -> WorkerResult<BatchSummary>
where
    S: Fn(BatchEvent) + Send + Sync + 'static,
{
    let requests = request.clip_requests()?;
    let total = requests.len();
    let sink = Arc::new(sink);
    let mut summary = BatchSummary::default();

    info!(source = %request.source_video_id, total, "Starting batch");

    for (index, clip) in requests.iter().enumerate() {
        if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            summary.cancelled = true;
            break;
        }

        sink(BatchEvent::ClipStart {
            title: clip.title.clone(),
            index,
            total,
        });

        let progress_sink = sink.clone();
        let title = clip.title.clone();
        let on_progress = move |event: bclip_models::ProgressEvent| {
            progress_sink(BatchEvent::ClipProgress {
                title: title.clone(),
                index,
                percent: event.percent_complete,
                status: event.message,
            })
        };

        match pipeline.create_clip(clip, cancel.clone(), on_progress).await {
            Ok(ClipOutcome::Completed(result)) => {
                summary.completed += 1;
                sink(BatchEvent::ClipComplete {
                    title: clip.title.clone(),
                    index,
                    result,
                });
            }
            Ok(ClipOutcome::Cancelled) => {
                summary.cancelled = true;
                sink(BatchEvent::ClipCancelled {
                    title: clip.title.clone(),
                    index,
                });
                break;
            }
            Err(e) => {
                warn!(title = %clip.title, index, error = %e, "Clip failed, continuing batch");
                summary.failed += 1;
                sink(BatchEvent::ClipError {
                    title: clip.title.clone(),
                    index,
                    error: e.to_string(),
                });
            }
        }
    }

    sink(BatchEvent::AllComplete {
        completed: summary.completed,
        failed: summary.failed,
        cancelled: summary.cancelled,
    });

    info!(
        completed = summary.completed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Batch finished"
    );

    Ok(summary)
}
