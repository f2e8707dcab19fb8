//! Batch requests and the event stream emitted while a batch runs.
//!
//! Event names mirror the server-sent event stream the web layer forwards
//! to clients (`clip-start`, `clip-progress`, ...).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clip::{ClipRequest, RenderResult, RequestError};

/// One chapter to cut out of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchClip {
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// Several clips cut from the same source recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub source_video_id: String,
    pub clips: Vec<BatchClip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl BatchRequest {
    /// Expand into one request per clip, in batch order.
    pub fn clip_requests(&self) -> Result<Vec<ClipRequest>, RequestError> {
        if self.source_video_id.trim().is_empty() {
            return Err(RequestError::MissingSourceVideo);
        }
        if self.clips.is_empty() {
            return Err(RequestError::EmptyBatch);
        }

        Ok(self
            .clips
            .iter()
            .map(|clip| ClipRequest {
                source_video_id: self.source_video_id.clone(),
                title: clip.title.clone(),
                start_time: clip.start_time,
                end_time: clip.end_time,
                output_prefix: self.prefix.clone(),
                transcript: self.transcript.clone(),
            })
            .collect())
    }
}

/// Events emitted while a batch is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BatchEvent {
    /// A clip is about to start
    ClipStart {
        title: String,
        index: usize,
        total: usize,
    },

    /// Progress of the clip currently rendering
    ClipProgress {
        title: String,
        index: usize,
        percent: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    /// A clip finished
    ClipComplete {
        title: String,
        index: usize,
        result: RenderResult,
    },

    /// A clip failed; the batch continues
    ClipError {
        title: String,
        index: usize,
        error: String,
    },

    /// A clip was cancelled by the user; the batch stops
    ClipCancelled { title: String, index: usize },

    /// The batch is over
    AllComplete {
        completed: usize,
        failed: usize,
        cancelled: bool,
    },
}

impl BatchEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::ClipStart { .. } => "clip-start",
            BatchEvent::ClipProgress { .. } => "clip-progress",
            BatchEvent::ClipComplete { .. } => "clip-complete",
            BatchEvent::ClipError { .. } => "clip-error",
            BatchEvent::ClipCancelled { .. } => "clip-cancelled",
            BatchEvent::AllComplete { .. } => "all-complete",
        }
    }
}
