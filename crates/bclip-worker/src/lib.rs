//! Branded clip worker.
//!
//! This crate provides:
//! - The clip pipeline (title suggestion, branded render, thumbnails)
//! - Sequential batch processing with per-clip events
//! - Worker configuration, structured clip logging and metrics

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use batch::{run_batch, BatchSummary};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::ClipLogger;
pub use pipeline::{ClipOutcome, ClipPipeline};
