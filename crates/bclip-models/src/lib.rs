//! Shared data models for BrandClip.
//!
//! This crate provides Serde-serializable types for:
//! - Clip requests, identities and render results
//! - Progress events and batch event streams
//! - Encoding and canvas configuration
//! - Timestamp parsing and transcript alignment

pub mod batch;
pub mod clip;
pub mod encoding;
pub mod progress;
pub mod timestamp;
pub mod transcript;

// Re-export common types
pub use batch::{BatchClip, BatchEvent, BatchRequest};
pub use clip::{
    sanitize_title, ClipIdentity, ClipRequest, RenderResult, RequestError, ThumbnailCandidate,
    ThumbnailMode,
};
pub use encoding::{CanvasConfig, EncodingConfig};
pub use progress::{ProgressEvent, RENDER_PROGRESS_CAP, THUMBNAILS_PROGRESS};
pub use timestamp::{parse_time_marker, TimestampError};
pub use transcript::{collect_markers, extract_fragment, TimeMarker, CONTEXT_BUFFER_SECS};
