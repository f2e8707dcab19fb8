//! Worker error types.

use thiserror::Error;

use bclip_media::MediaError;
use bclip_models::RequestError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Render failed: {0}")]
    Render(#[source] MediaError),

    #[error("Thumbnail failed: {0}")]
    Thumbnails(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn thumbnails(msg: impl Into<String>) -> Self {
        Self::Thumbnails(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Transcoder output attached to a render failure.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Render(e) => e.diagnostic(),
            _ => None,
        }
    }
}
