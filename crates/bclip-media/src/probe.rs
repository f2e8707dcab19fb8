//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolPaths;
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Whether an audio stream is present; concat needs silence in its place otherwise
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
}

/// Reads container metadata through the configured `ffprobe`.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    tools: ToolPaths,
}

impl MediaProbe {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            tools: tools.clone(),
        }
    }

    /// Probe a media file.
    pub async fn probe(&self, path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let ffprobe = self.tools.resolve_ffprobe()?;

        let output = Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::FfprobeFailed {
                message: format!("FFprobe failed for {}", path.display()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            });
        }

        parse_probe_output(&output.stdout)
    }

    /// Duration in seconds. A file without a readable duration is an error.
    pub async fn duration(&self, path: impl AsRef<Path>) -> MediaResult<f64> {
        let path = path.as_ref();
        let info = self.probe(path).await?;
        if info.duration > 0.0 {
            Ok(info.duration)
        } else {
            Err(MediaError::FfprobeFailed {
                message: format!("No duration reported for {}", path.display()),
                stderr: None,
            })
        }
    }

    /// Duration in seconds, or zero when it cannot be read.
    pub async fn duration_or_zero(&self, path: impl AsRef<Path>) -> f64 {
        let path = path.as_ref();
        match self.duration(path).await {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Duration unavailable, using 0");
                0.0
            }
        }
    }
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    Ok(MediaInfo { duration, has_audio })
}
