//! Title generator abstraction and the recover-and-continue wrapper.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{TitleError, TitleResult};

/// Longest title that survives truncation in mobile feeds.
pub const MAX_TITLE_CHARS: usize = 60;

/// Produces a suggested clip title.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    /// Suggest a title for the clip whose transcript is `fragment`.
    async fn generate(&self, fragment: &str, original_title: &str) -> TitleResult<String>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Generator used when no service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTitleGenerator;

#[async_trait]
impl TitleGenerator for NoopTitleGenerator {
    async fn generate(&self, _fragment: &str, _original_title: &str) -> TitleResult<String> {
        Err(TitleError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Ask `generator` for a title, returning the original on any failure.
pub async fn suggest_title(generator: &dyn TitleGenerator, fragment: &str, original_title: &str) -> String {
    match generator.generate(fragment, original_title).await {
        Ok(raw) => match clean_title(&raw) {
            Some(title) => {
                info!(generator = generator.name(), title = %title, "Generated clip title");
                title
            }
            None => {
                warn!(generator = generator.name(), "Empty title suggestion, keeping original");
                original_title.to_string()
            }
        },
        Err(TitleError::NotConfigured) => original_title.to_string(),
        Err(e) => {
            warn!(generator = generator.name(), error = %e, "Title generation failed, keeping original");
            original_title.to_string()
        }
    }
}

/// Strip heading markers and wrapping quotes from a model answer.
///
/// Returns `None` when nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let title = raw.trim().trim_start_matches('#').trim_start();
    let title = title.strip_prefix(['"', '\'']).unwrap_or(title);
    let title = title.strip_suffix(['"', '\'']).unwrap_or(title);
    let title = title.trim();

    (!title.is_empty()).then(|| title.to_string())
}
