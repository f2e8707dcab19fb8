//! Structured clip logging.

use tracing::{error, info, warn, Span};

use bclip_models::ClipIdentity;

/// Logs lifecycle events of one clip with its identity attached.
#[derive(Debug, Clone)]
pub struct ClipLogger {
    clip_id: String,
    label: String,
    operation: String,
}

impl ClipLogger {
    pub fn new(identity: &ClipIdentity, operation: &str) -> Self {
        Self {
            clip_id: identity.key.clone(),
            label: identity.label.clone(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            clip_id = %self.clip_id,
            label = %self.label,
            operation = %self.operation,
            "Clip started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            clip_id = %self.clip_id,
            operation = %self.operation,
            "Clip error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            clip_id = %self.clip_id,
            label = %self.label,
            operation = %self.operation,
            "Clip completed: {}", message
        );
    }

    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the clip's identity, for instrumenting its futures.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "clip",
            clip_id = %self.clip_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_logger_creation() {
        let identity = ClipIdentity {
            label: "Title".to_string(),
            key: "feedfacecafebeef".to_string(),
        };
        let logger = ClipLogger::new(&identity, "create_clip");

        assert_eq!(logger.clip_id(), "feedfacecafebeef");
        assert_eq!(logger.operation(), "create_clip");
    }
}
