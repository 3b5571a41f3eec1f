//! Data model for reconstructed generation state and request bodies.

use serde::{Deserialize, Serialize};

/// One in-progress or completed chapter as reconstructed from the stream.
///
/// Keyed by `chapter_id`; at most one section exists per id and insertion
/// order is preserved. `body` only grows, except when a replace event
/// substitutes the whole text at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub chapter_id: String,
    pub chapter_number: u32,
    pub title: String,
    /// Raw accumulated text; may still contain an embedded plan object.
    pub body: String,
    /// True until the section receives its first confirmed content flush.
    pub waiting: bool,
}

impl Section {
    pub(crate) fn waiting(chapter_id: String, chapter_number: u32, title: String) -> Self {
        Self {
            chapter_id,
            chapter_number,
            title,
            body: String::new(),
            waiting: true,
        }
    }
}

/// Terminal summary record for a finished chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: String,
    pub chapter_number: u32,
    pub title: String,
    pub status: String,
    pub word_count: u64,
    /// Count of blocking consistency conflicts found by the generator.
    pub p0_count: u64,
}

/// Generation mode requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Studio,
    Quick,
    Cinematic,
}

/// How much of the book one streaming run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationScope {
    #[default]
    Volume,
    Book,
}

/// Request body for the one-shot book streaming endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookStreamRequest {
    pub prompt: String,
    pub mode: GenerationMode,
    pub scope: GenerationScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_count: Option<u32>,
    pub words_per_chapter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_chapter_number: Option<u32>,
    pub auto_approve: bool,
    pub continuation_mode: bool,
}

impl BookStreamRequest {
    /// Create a request with the backend's defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: GenerationMode::default(),
            scope: GenerationScope::default(),
            chapter_count: None,
            words_per_chapter: 1600,
            start_chapter_number: None,
            auto_approve: false,
            continuation_mode: false,
        }
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_scope(mut self, scope: GenerationScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_chapter_count(mut self, count: u32) -> Self {
        self.chapter_count = Some(count);
        self
    }

    pub fn with_words_per_chapter(mut self, words: u32) -> Self {
        self.words_per_chapter = words;
        self
    }

    pub fn with_start_chapter_number(mut self, number: u32) -> Self {
        self.start_chapter_number = Some(number);
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Continue from existing chapters instead of starting a fresh volume.
    pub fn with_continuation(mut self, continuation: bool) -> Self {
        self.continuation_mode = continuation;
        self
    }
}
