//! Title generation errors.

use thiserror::Error;

/// Result type for title generation.
pub type TitleResult<T> = Result<T, TitleError>;

/// Errors from the title generation service. Always recovered by callers.
#[derive(Debug, Error)]
pub enum TitleError {
    #[error("Title service not configured")]
    NotConfigured,

    #[error("Title request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Title service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed title response: {0}")]
    Malformed(String),
}
