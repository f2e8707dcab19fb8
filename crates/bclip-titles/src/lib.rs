//! Clip title suggestions.
//!
//! A [`TitleGenerator`] turns a transcript fragment and the original title
//! into a short, punchy clip title. Generation is best effort:
//! [`suggest_title`] never fails and falls back to the original title.

pub mod cohere;
pub mod error;
pub mod generator;

pub use cohere::{CohereTitleGenerator, DEFAULT_COHERE_ENDPOINT, DEFAULT_TITLE_MODEL};
pub use error::{TitleError, TitleResult};
pub use generator::{clean_title, suggest_title, NoopTitleGenerator, TitleGenerator, MAX_TITLE_CHARS};
