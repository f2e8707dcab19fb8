//! Worker configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use bclip_media::ToolPaths;
use bclip_models::{CanvasConfig, ClipIdentity, EncodingConfig, ThumbnailMode};
use bclip_titles::{CohereTitleGenerator, NoopTitleGenerator, TitleGenerator, DEFAULT_TITLE_MODEL};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for per-clip temporary files
    pub work_dir: PathBuf,
    /// Where rendered clips are written
    pub clips_dir: PathBuf,
    /// Where downloaded source recordings live (`{id}.mp4`)
    pub source_dir: PathBuf,
    /// Intro bumper
    pub intro_path: Option<PathBuf>,
    /// Ending bumper
    pub ending_path: Option<PathBuf>,
    /// Thumbnail candidates to produce per clip
    pub thumbnail_mode: ThumbnailMode,
    /// Kill renders running longer than this
    pub render_timeout: Option<Duration>,
    /// Cohere key; titles are left alone without it
    pub cohere_api_key: Option<String>,
    /// Chat model used for titles
    pub title_model: String,
    /// Show description handed to the title model
    pub show_context: Option<String>,
    /// FFmpeg / FFprobe locations
    pub tools: ToolPaths,
    pub encoding: EncodingConfig,
    pub canvas: CanvasConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("bclip"),
            clips_dir: PathBuf::from("clips"),
            source_dir: PathBuf::from("sources"),
            intro_path: None,
            ending_path: None,
            thumbnail_mode: ThumbnailMode::default(),
            render_timeout: Some(Duration::from_secs(3600)), // 1 hour
            cohere_api_key: None,
            title_model: DEFAULT_TITLE_MODEL.to_string(),
            show_context: None,
            tools: ToolPaths::default(),
            encoding: EncodingConfig::default(),
            canvas: CanvasConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let thumbnail_mode = match std::env::var("BCLIP_THUMBNAIL_MODE") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                warn!("{}, using {:?}", e, defaults.thumbnail_mode);
                defaults.thumbnail_mode
            }),
            Err(_) => defaults.thumbnail_mode,
        };

        // 0 disables the timeout.
        let render_timeout = match std::env::var("BCLIP_RENDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.render_timeout,
        };

        Self {
            work_dir: env_path("BCLIP_WORK_DIR").unwrap_or(defaults.work_dir),
            clips_dir: env_path("BCLIP_CLIPS_DIR").unwrap_or(defaults.clips_dir),
            source_dir: env_path("BCLIP_SOURCE_DIR").unwrap_or(defaults.source_dir),
            intro_path: env_path("BCLIP_INTRO_PATH"),
            ending_path: env_path("BCLIP_ENDING_PATH"),
            thumbnail_mode,
            render_timeout,
            cohere_api_key: env_string("COHERE_API_KEY"),
            title_model: env_string("BCLIP_TITLE_MODEL").unwrap_or(defaults.title_model),
            show_context: env_string("BCLIP_SHOW_CONTEXT"),
            tools: ToolPaths::from_env(),
            encoding: defaults.encoding,
            canvas: defaults.canvas,
        }
    }

    /// Source recording for a video id.
    pub fn source_path(&self, source_video_id: &str) -> PathBuf {
        self.source_dir.join(format!("{}.mp4", source_video_id))
    }

    /// Rendered clip file for an identity.
    pub fn clip_path(&self, identity: &ClipIdentity) -> PathBuf {
        self.clips_dir.join(format!("{}.mp4", identity.label))
    }

    /// Per-clip thumbnail directory, owned by a single render.
    pub fn thumbnail_dir(&self, identity: &ClipIdentity) -> PathBuf {
        self.work_dir.join("thumbnails").join(&identity.key)
    }

    /// Title generator for this configuration.
    pub fn title_generator(&self) -> Arc<dyn TitleGenerator> {
        let Some(key) = &self.cohere_api_key else {
            warn!("COHERE_API_KEY is not set, clip titles will not be generated");
            return Arc::new(NoopTitleGenerator);
        };

        match CohereTitleGenerator::new(key.clone()) {
            Ok(generator) => {
                let generator = generator.with_model(self.title_model.clone());
                match &self.show_context {
                    Some(context) => Arc::new(generator.with_show_context(context.clone())),
                    None => Arc::new(generator),
                }
            }
            Err(e) => {
                warn!("Failed to create title client: {}", e);
                Arc::new(NoopTitleGenerator)
            }
        }
    }

    /// Render timeout in whole seconds.
    pub fn render_timeout_secs(&self) -> Option<u64> {
        self.render_timeout.map(|d| d.as_secs())
    }

    /// Create the working and output directories.
    pub async fn prepare_dirs(&self) -> WorkerResult<()> {
        for dir in [&self.work_dir, &self.clips_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                WorkerError::config_error(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(PathBuf::from)
}
