//! Progress events emitted while a clip is produced.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Highest percentage the render phase may report. The rest is kept for
/// thumbnail generation.
pub const RENDER_PROGRESS_CAP: f64 = 90.0;

/// Percentage reported once the render finishes and thumbnails start.
pub const THUMBNAILS_PROGRESS: f64 = 91.0;

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// 0 to 100
    pub percent_complete: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    /// Create an event with a status message.
    pub fn new(percent: f64, message: impl Into<String>) -> Self {
        Self {
            percent_complete: percent.clamp(0.0, 100.0),
            message: Some(message.into()),
        }
    }

    /// Render-phase event for a computed percentage.
    pub fn rendering(percent: f64) -> Self {
        let percent = percent.min(RENDER_PROGRESS_CAP);
        Self::new(percent, format!("Rendering video: {}%", percent.round() as u32))
    }

    /// Final event of a successful clip.
    pub fn done() -> Self {
        Self::new(100.0, "Clip created successfully")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering_event_is_capped() {
        let event = ProgressEvent::rendering(97.0);
        assert_eq!(event.percent_complete, RENDER_PROGRESS_CAP);
        assert_eq!(event.message.as_deref(), Some("Rendering video: 90%"));
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(ProgressEvent::new(-3.0, "x").percent_complete, 0.0);
        assert_eq!(ProgressEvent::new(140.0, "x").percent_complete, 100.0);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_value(ProgressEvent::new(45.0, "x")).unwrap();
        assert_eq!(json["percentComplete"], 45.0);
        assert_eq!(json["message"], "x");
    }
}
