//! FFmpeg CLI wrapper for branded clip rendering.
//!
//! This crate provides:
//! - Multi-input FFmpeg command building and a cancellable runner
//! - Progress parsing from `-progress` blocks and stats lines
//! - Duration probing through FFprobe
//! - Branded rendering (intro, segment, ending)
//! - Still frame extraction and loudness peak detection

pub mod command;
pub mod config;
pub mod error;
pub mod filters;
pub mod loudness;
pub mod probe;
pub mod progress;
pub mod render;
pub mod thumbnail;

#[cfg(all(test, unix))]
mod testing;

pub use command::{wait_for_cancel, FfmpegCommand, FfmpegInput, FfmpegRunner, StderrSink};
pub use config::ToolPaths;
pub use error::{MediaError, MediaResult};
pub use filters::ConcatInput;
pub use loudness::{LoudnessLocator, PeakTracker};
pub use probe::{MediaInfo, MediaProbe};
pub use progress::{render_percent, FfmpegProgress};
pub use render::{RenderJob, RenderPlan, RenderReport, Renderer};
pub use thumbnail::FrameExtractor;
