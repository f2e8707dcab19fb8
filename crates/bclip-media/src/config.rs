//! Locations of the external tools, injected into every media operation.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Paths to the FFmpeg and FFprobe binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl ToolPaths {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Read `BCLIP_FFMPEG` / `BCLIP_FFPROBE`, falling back to names on PATH.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg: std::env::var_os("BCLIP_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg),
            ffprobe: std::env::var_os("BCLIP_FFPROBE")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe),
        }
    }

    /// Resolve the FFmpeg binary to an executable path.
    pub fn resolve_ffmpeg(&self) -> MediaResult<PathBuf> {
        resolve(&self.ffmpeg).ok_or_else(|| MediaError::FfmpegNotFound(self.ffmpeg.clone()))
    }

    /// Resolve the FFprobe binary to an executable path.
    pub fn resolve_ffprobe(&self) -> MediaResult<PathBuf> {
        resolve(&self.ffprobe).ok_or_else(|| MediaError::FfprobeNotFound(self.ffprobe.clone()))
    }
}

fn resolve(program: &Path) -> Option<PathBuf> {
    which::which(program).ok()
}
