//! Batching of high-frequency text fragments into low-frequency state merges.
//!
//! The backend streams chapter text in very small fragments (often single
//! characters). Merging each one straight into the section collection would
//! churn the UI on every network chunk, so fragments park in per-chapter
//! buffers and merge on a short fixed delay. The timer is debounced: a
//! fragment arriving while a flush is armed does not push the deadline out,
//! so at most one flush is pending at any time.

use std::time::Duration;

use tokio::time::Instant;

use crate::state::StudioState;

/// Delay between the first buffered fragment and its merge into state.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Ephemeral per-chapter buffer of fragments not yet merged into a section.
#[derive(Debug)]
struct ChunkBuffer {
    chapter_id: String,
    chapter_number: u32,
    title: Option<String>,
    pending: Vec<String>,
}

/// Accumulates chapter text fragments and flushes them into [`StudioState`].
#[derive(Debug)]
pub struct ChunkCoalescer {
    buffers: Vec<ChunkBuffer>,
    deadline: Option<Instant>,
    interval: Duration,
}

impl Default for ChunkCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCoalescer {
    pub fn new() -> Self {
        Self::with_interval(FLUSH_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            buffers: Vec::new(),
            deadline: None,
            interval,
        }
    }

    /// Append a fragment to the chapter's pending buffer and arm the flush
    /// deadline if none is armed yet.
    pub fn push(
        &mut self,
        chapter_id: &str,
        chapter_number: u32,
        title: Option<&str>,
        fragment: &str,
    ) {
        let buffer = self.buffer_mut(chapter_id, chapter_number);
        buffer.chapter_number = chapter_number;
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            buffer.title = Some(title.to_string());
        }
        buffer.pending.push(fragment.to_string());

        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.interval);
        }
    }

    /// Create an empty buffer for a chapter that just started, without
    /// arming the flush timer.
    pub fn ensure_buffer(&mut self, chapter_id: &str, chapter_number: u32, title: &str) {
        let buffer = self.buffer_mut(chapter_id, chapter_number);
        buffer.chapter_number = chapter_number;
        if !title.is_empty() {
            buffer.title = Some(title.to_string());
        }
    }

    /// The armed flush deadline, if a flush is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Merge every pending fragment into the section collection, in arrival
    /// order, and disarm the timer. Idempotent: with nothing pending this is
    /// a no-op.
    pub fn flush(&mut self, state: &mut StudioState) {
        self.deadline = None;
        for buffer in &mut self.buffers {
            if buffer.pending.is_empty() {
                continue;
            }
            let delta: String = buffer.pending.drain(..).collect();
            let title = state
                .section_title(&buffer.chapter_id)
                .or_else(|| buffer.title.clone())
                .unwrap_or_else(|| format!("Chapter {}", buffer.chapter_number));
            state.append_section_body(
                &buffer.chapter_id,
                buffer.chapter_number,
                &title,
                &delta,
            );
        }
    }

    /// Discard all buffers and cancel any scheduled flush.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.deadline = None;
    }

    fn buffer_mut(&mut self, chapter_id: &str, chapter_number: u32) -> &mut ChunkBuffer {
        if let Some(i) = self.buffers.iter().position(|b| b.chapter_id == chapter_id) {
            return &mut self.buffers[i];
        }
        self.buffers.push(ChunkBuffer {
            chapter_id: chapter_id.to_string(),
            chapter_number,
            title: None,
            pending: Vec::new(),
        });
        self.buffers.last_mut().unwrap()
    }
}
