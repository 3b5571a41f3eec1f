//! Observable generation state reconstructed from the stream.
//!
//! A single store object owns the ordered section and chapter collections,
//! the bounded log, the session error string, and the generating flag. Reads
//! are public; mutation stays inside the crate so every write flows through
//! the dispatcher and coalescer.

use std::collections::VecDeque;

use crate::models::{ChapterRecord, Section};

/// Oldest log lines are dropped beyond this cap.
pub const LOG_CAP: usize = 200;

/// Reactive state surface exposed to the embedding UI.
#[derive(Debug, Default)]
pub struct StudioState {
    sections: Vec<Section>,
    chapters: Vec<ChapterRecord>,
    log: VecDeque<String>,
    error: Option<String>,
    generating: bool,
}

impl StudioState {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-progress and completed sections, in insertion order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Terminal chapter records, in arrival order.
    pub fn chapters(&self) -> &[ChapterRecord] {
        &self.chapters
    }

    /// Bounded log lines, oldest first.
    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn section(&self, chapter_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.chapter_id == chapter_id)
    }

    /// Existing non-empty display title for a section, if any.
    pub(crate) fn section_title(&self, chapter_id: &str) -> Option<String> {
        self.section(chapter_id)
            .map(|s| s.title.clone())
            .filter(|t| !t.is_empty())
    }

    /// Insert a waiting section for a chapter that just started, or refresh
    /// the number/title of one that already exists.
    pub(crate) fn upsert_waiting_section(&mut self, chapter_id: &str, number: u32, title: &str) {
        match self.section_mut(chapter_id) {
            Some(section) => {
                section.chapter_number = number;
                if !title.is_empty() {
                    section.title = title.to_string();
                }
            }
            None => self.sections.push(Section::waiting(
                chapter_id.to_string(),
                number,
                title.to_string(),
            )),
        }
    }

    /// Append a flushed delta to a section's body, creating the section if
    /// the first chunk arrived without a start event. Clears `waiting`.
    pub(crate) fn append_section_body(
        &mut self,
        chapter_id: &str,
        number: u32,
        title: &str,
        delta: &str,
    ) {
        match self.section_mut(chapter_id) {
            Some(section) => {
                if section.title.is_empty() && !title.is_empty() {
                    section.title = title.to_string();
                }
                section.body.push_str(delta);
                section.waiting = false;
            }
            None => {
                let mut section =
                    Section::waiting(chapter_id.to_string(), number, title.to_string());
                section.body.push_str(delta);
                section.waiting = false;
                self.sections.push(section);
            }
        }
    }

    /// Atomically substitute a section's whole body. Clears `waiting`.
    pub(crate) fn replace_section_body(
        &mut self,
        chapter_id: &str,
        number: u32,
        title: Option<&str>,
        body: &str,
    ) {
        match self.section_mut(chapter_id) {
            Some(section) => {
                if let Some(title) = title.filter(|t| !t.is_empty()) {
                    section.title = title.to_string();
                }
                section.body = body.to_string();
                section.waiting = false;
            }
            None => {
                let mut section = Section::waiting(
                    chapter_id.to_string(),
                    number,
                    title.unwrap_or_default().to_string(),
                );
                section.body = body.to_string();
                section.waiting = false;
                self.sections.push(section);
            }
        }
    }

    /// Record a finished chapter and settle its section.
    pub(crate) fn push_chapter(&mut self, record: ChapterRecord) {
        if let Some(section) = self.section_mut(&record.id) {
            section.waiting = false;
        }
        self.chapters.push(record);
    }

    pub(crate) fn push_log(&mut self, line: impl Into<String>) {
        let stamped = format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line.into());
        if self.log.len() == LOG_CAP {
            self.log.pop_front();
        }
        self.log.push_back(stamped);
    }

    pub(crate) fn set_error(&mut self, detail: impl Into<String>) {
        self.error = Some(detail.into());
    }

    /// Reset session-scoped state at the start of a new run.
    pub(crate) fn begin_session(&mut self) {
        self.sections.clear();
        self.chapters.clear();
        self.log.clear();
        self.error = None;
        self.generating = true;
    }

    /// Sections and the error string survive so a resumed session can pick
    /// up from the accumulated offset.
    pub(crate) fn end_session(&mut self) {
        self.generating = false;
    }

    fn section_mut(&mut self, chapter_id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.chapter_id == chapter_id)
    }
}
