//! Clip request, identity and render result models.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Characters that cannot appear in a file name on at least one platform.
const PATH_HOSTILE: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Maximum length of a sanitized label, in characters.
const MAX_LABEL_CHARS: usize = 120;

/// Errors for malformed clip requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("source video id is required")]
    MissingSourceVideo,

    #[error("clip title is required")]
    MissingTitle,

    #[error("invalid time range: start {start}s, end {end}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("batch contains no clips")]
    EmptyBatch,
}

/// A request to render one branded clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    /// Identifier of the downloaded source recording
    pub source_video_id: String,
    /// Clip title (chapter name)
    pub title: String,
    /// Start of the cut in the source, seconds
    pub start_time: f64,
    /// End of the cut in the source, seconds
    pub end_time: f64,
    /// Optional prefix added to the output file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<String>,
    /// Full episode transcript with time markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl ClipRequest {
    /// Clip length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Check the request before any work starts.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.source_video_id.trim().is_empty() {
            return Err(RequestError::MissingSourceVideo);
        }
        if self.title.trim().is_empty() {
            return Err(RequestError::MissingTitle);
        }
        let range_ok = self.start_time.is_finite()
            && self.end_time.is_finite()
            && self.start_time >= 0.0
            && self.end_time > self.start_time;
        if !range_ok {
            return Err(RequestError::InvalidRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }
}

/// Two-part clip identity: a readable label and a collision-resistant key.
///
/// The label names the rendered file; the key names per-clip working
/// directories so that two clips with similar titles never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ClipIdentity {
    /// Display name, also the stem of the rendered clip file
    pub label: String,
    /// Hex digest prefix derived from source, prefix, title and time range
    pub key: String,
}

impl ClipIdentity {
    /// Derive the identity for a request. Stable across retries.
    ///
    /// Two windows of one source under the same title share a label, and so
    /// a clip file, but never a key.
    pub fn for_request(request: &ClipRequest) -> Self {
        let prefix = request
            .output_prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let display = match prefix {
            Some(p) => format!("[{}] - {}", p, request.title.trim()),
            None => request.title.trim().to_string(),
        };

        let mut hasher = Sha256::new();
        hasher.update(request.source_video_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(prefix.unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(request.title.trim().as_bytes());
        hasher.update(request.start_time.to_le_bytes());
        hasher.update(request.end_time.to_le_bytes());
        let digest = hasher.finalize();
        let key = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();

        Self {
            label: sanitize_title(&display),
            key,
        }
    }
}

impl fmt::Display for ClipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.key)
    }
}

/// Make a title safe to use as a file name.
///
/// Path-hostile characters become `-`, control characters are dropped and
/// trailing dots/spaces are trimmed. Unicode letters are kept so titles stay
/// readable.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if PATH_HOSTILE.contains(&c) { '-' } else { c })
        .take(MAX_LABEL_CHARS)
        .collect();

    let cleaned = cleaned.trim().trim_end_matches(['.', ' ']);
    if cleaned.is_empty() {
        "clip".to_string()
    } else {
        cleaned.to_string()
    }
}

/// How many thumbnail candidates to produce after rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailMode {
    /// One frame at 30% of the clip
    Minimal,
    /// Loudness peak plus frames at 20/40/60/80%
    #[default]
    Rich,
}

impl FromStr for ThumbnailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "rich" => Ok(Self::Rich),
            other => Err(format!("unknown thumbnail mode: {}", other)),
        }
    }
}

/// A still frame offered as a thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailCandidate {
    /// "peak", "default", "v1".."v4" or "custom"
    pub label: String,
    /// Position of the frame in the rendered clip
    pub timestamp_seconds: f64,
    /// Where the frame was written
    pub file_path: PathBuf,
}

/// Everything a finished clip hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub rendered_video_path: PathBuf,
    pub clip_id: ClipIdentity,
    /// Candidates in generation order; may be partial
    pub generated_thumbnails: Vec<ThumbnailCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_title: Option<String>,
    /// Non-fatal problems, e.g. no thumbnail could be produced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str) -> ClipRequest {
        ClipRequest {
            source_video_id: "abc123".to_string(),
            title: title.to_string(),
            start_time: 100.0,
            end_time: 130.0,
            output_prefix: None,
            transcript: None,
        }
    }

    #[test]
    fn test_duration() {
        assert_eq!(request("x").duration(), 30.0);
    }

    #[test]
    fn test_validate() {
        assert!(request("Ok").validate().is_ok());

        let mut bad = request("Ok");
        bad.end_time = 100.0;
        assert!(matches!(bad.validate(), Err(RequestError::InvalidRange { .. })));

        let mut bad = request("Ok");
        bad.start_time = -1.0;
        assert!(matches!(bad.validate(), Err(RequestError::InvalidRange { .. })));

        let mut bad = request("Ok");
        bad.end_time = f64::NAN;
        assert!(matches!(bad.validate(), Err(RequestError::InvalidRange { .. })));

        assert_eq!(request("  ").validate(), Err(RequestError::MissingTitle));

        let mut bad = request("Ok");
        bad.source_video_id.clear();
        assert_eq!(bad.validate(), Err(RequestError::MissingSourceVideo));
    }

    #[test]
    fn test_sanitize_title() {
        let safe = sanitize_title("A/B: Test?");
        assert!(!safe.contains(PATH_HOSTILE));
        assert_eq!(safe, "A-B- Test-");
        assert_eq!(sanitize_title("Café <résumé>"), "Café -résumé-");
        assert_eq!(sanitize_title("trailing dots..."), "trailing dots");
        assert_eq!(sanitize_title("???"), "---");
        assert_eq!(sanitize_title("   "), "clip");
    }

    #[test]
    fn test_identity_is_stable_and_distinct() {
        let a = ClipIdentity::for_request(&request("Same title"));
        let b = ClipIdentity::for_request(&request("Same title"));
        assert_eq!(a, b);
        assert_eq!(a.key.len(), 16);

        let c = ClipIdentity::for_request(&request("Same title?"));
        let d = ClipIdentity::for_request(&request("Same title*"));
        // Both sanitize to the same label but keep distinct keys.
        assert_eq!(c.label, d.label);
        assert_ne!(c.key, d.key);
    }

    #[test]
    fn test_same_title_different_range() {
        let first = request("Cold open");
        let mut second = request("Cold open");
        second.start_time = 400.0;
        second.end_time = 430.0;

        let a = ClipIdentity::for_request(&first);
        let b = ClipIdentity::for_request(&second);
        assert_eq!(a.label, b.label);
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_identity_with_prefix() {
        let mut req = request("Big laugh");
        req.output_prefix = Some("3x07".to_string());
        let id = ClipIdentity::for_request(&req);
        assert_eq!(id.label, "[3x07] - Big laugh");
        assert_ne!(id.key, ClipIdentity::for_request(&request("Big laugh")).key);
    }

    #[test]
    fn test_thumbnail_mode_from_str() {
        assert_eq!("rich".parse::<ThumbnailMode>().unwrap(), ThumbnailMode::Rich);
        assert_eq!(" Minimal ".parse::<ThumbnailMode>().unwrap(), ThumbnailMode::Minimal);
        assert!("fancy".parse::<ThumbnailMode>().is_err());
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let json = r#"{"sourceVideoId":"v1","title":"T","startTime":1.5,"endTime":4,"duration":2.5}"#;
        let req: ClipRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.start_time, 1.5);
        assert_eq!(req.duration(), 2.5);
        assert!(req.transcript.is_none());
    }
}
