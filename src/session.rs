//! Generation session lifecycle: start, event dispatch, settle, stop.
//!
//! One controller owns one session at a time. `start` opens the transport
//! call and spawns the drive loop; `stop` requests cooperative cancellation.
//! Whatever way a session ends (completion, upstream error, transport
//! failure, cancellation) the controller runs the same settle sequence: a
//! final coalescer flush, buffer clearing, and resetting the active flag, so
//! the state surface never reports "generating" after the session is over
//! and no buffered fragment is ever lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{sleep_until, Instant};

use crate::cancel::CancelToken;
use crate::client::{StudioClient, StudioError};
use crate::coalescer::{ChunkCoalescer, FLUSH_INTERVAL};
use crate::models::{BookStreamRequest, ChapterRecord};
use crate::sse::StreamEvent;
use crate::state::StudioState;

type ChapterCallback = Box<dyn Fn(&ChapterRecord) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;
type FinishedCallback = Box<dyn Fn() + Send + Sync>;

/// Caller-supplied callbacks for session milestones. All optional.
#[derive(Default)]
pub struct SessionHooks {
    chapter_started: Option<ChapterCallback>,
    chapter_done: Option<ChapterCallback>,
    error: Option<ErrorCallback>,
    finished: Option<FinishedCallback>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the generator announces a new chapter, with a synthesized
    /// in-progress record.
    pub fn on_chapter_started(mut self, f: impl Fn(&ChapterRecord) + Send + Sync + 'static) -> Self {
        self.chapter_started = Some(Box::new(f));
        self
    }

    /// Called with the terminal record when a chapter finishes.
    pub fn on_chapter_done(mut self, f: impl Fn(&ChapterRecord) + Send + Sync + 'static) -> Self {
        self.chapter_done = Some(Box::new(f));
        self
    }

    /// Called exactly once when a session fails (upstream or transport).
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Called when the generator reports the whole run complete.
    pub fn on_finished(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.finished = Some(Box::new(f));
        self
    }

    fn notify_chapter_started(&self, record: &ChapterRecord) {
        if let Some(f) = &self.chapter_started {
            f(record);
        }
    }

    fn notify_chapter_done(&self, record: &ChapterRecord) {
        if let Some(f) = &self.chapter_done {
            f(record);
        }
    }

    fn notify_error(&self, detail: &str) {
        if let Some(f) = &self.error {
            f(detail);
        }
    }

    fn notify_finished(&self) {
        if let Some(f) = &self.finished {
            f();
        }
    }
}

/// Owns the session lifecycle and the observable state surface.
pub struct SessionController {
    client: Arc<StudioClient>,
    project_id: String,
    state: Arc<Mutex<StudioState>>,
    hooks: SessionHooks,
    active: AtomicBool,
    cancel: Mutex<CancelToken>,
    flush_interval: Duration,
}

impl SessionController {
    pub fn new(client: StudioClient, project_id: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            project_id: project_id.into(),
            state: Arc::new(Mutex::new(StudioState::new())),
            hooks: SessionHooks::default(),
            active: AtomicBool::new(false),
            cancel: Mutex::new(CancelToken::new()),
            flush_interval: FLUSH_INTERVAL,
        }
    }

    pub fn with_hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Handle to the shared state surface. Lock, read, release; the session
    /// task holds the lock only for synchronous mutation.
    pub fn state(&self) -> Arc<Mutex<StudioState>> {
        Arc::clone(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Begin one generation session.
    ///
    /// Returns `Err(StudioError::SessionActive)` while a session is running;
    /// the running session is unaffected. On success the drive loop runs on
    /// a spawned task until the stream settles.
    pub fn start(
        self: &Arc<Self>,
        request: BookStreamRequest,
    ) -> Result<tokio::task::JoinHandle<()>, StudioError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("start ignored: a session is already active");
            return Err(StudioError::SessionActive);
        }

        let cancel = CancelToken::new();
        *self.cancel.lock().unwrap() = cancel.clone();
        self.state.lock().unwrap().begin_session();

        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move {
            controller.drive(request, cancel).await;
        }))
    }

    /// Request cooperative cancellation of the running session, if any.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        tracing::info!("cancelling active generation session");
        self.cancel.lock().unwrap().cancel();
    }

    async fn drive(&self, request: BookStreamRequest, cancel: CancelToken) {
        let mut coalescer = ChunkCoalescer::with_interval(self.flush_interval);

        let outcome = self.consume(&request, &mut coalescer, &cancel).await;

        // Settle sequence, identical on every exit path.
        {
            let mut state = self.state.lock().unwrap();
            coalescer.flush(&mut state);
            coalescer.clear();
        }

        match outcome {
            Ok(()) => {
                if cancel.is_cancelled() {
                    tracing::info!("generation session cancelled");
                } else {
                    tracing::info!("generation session ended");
                }
            }
            Err(err) => {
                let detail = err.to_string();
                tracing::warn!("generation session failed: {}", detail);
                {
                    let mut state = self.state.lock().unwrap();
                    state.set_error(&detail);
                    state.push_log(format!("stream failed: {}", detail));
                }
                self.hooks.notify_error(&detail);
            }
        }

        self.state.lock().unwrap().end_session();
        self.active.store(false, Ordering::SeqCst);
    }

    /// Drive the frame stream, interleaving coalescer flushes on the armed
    /// deadline. Returns `Err` only for transport-level failures; upstream
    /// `error` events are recorded inline and end the loop.
    async fn consume(
        &self,
        request: &BookStreamRequest,
        coalescer: &mut ChunkCoalescer,
        cancel: &CancelToken,
    ) -> Result<(), StudioError> {
        let mut frames = self
            .client
            .stream_book(&self.project_id, request, cancel.clone())
            .await?;

        loop {
            let deadline = coalescer.deadline();
            tokio::select! {
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let mut state = self.state.lock().unwrap();
                    coalescer.flush(&mut state);
                }
                next = frames.next() => match next {
                    None => break,
                    Some(Err(e)) => return Err(e),
                    Some(Ok(frame)) => {
                        let event = StreamEvent::from_frame(&frame);
                        if !self.apply_event(event, coalescer) {
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// One rule per event kind. Returns false when the loop should end.
    fn apply_event(&self, event: StreamEvent, coalescer: &mut ChunkCoalescer) -> bool {
        match event {
            StreamEvent::Heartbeat => {}
            StreamEvent::ChapterStart {
                chapter_id,
                chapter_number,
                title,
            } => {
                coalescer.ensure_buffer(&chapter_id, chapter_number, &title);
                {
                    let mut state = self.state.lock().unwrap();
                    state.upsert_waiting_section(&chapter_id, chapter_number, &title);
                    state.push_log(format!("chapter {} started: {}", chapter_number, title));
                }
                let record = ChapterRecord {
                    id: chapter_id,
                    chapter_number,
                    title,
                    status: "writing".to_string(),
                    word_count: 0,
                    p0_count: 0,
                };
                self.hooks.notify_chapter_started(&record);
            }
            StreamEvent::ChapterChunk {
                chapter_id,
                chapter_number,
                title,
                text,
            } => {
                coalescer.push(&chapter_id, chapter_number, title.as_deref(), &text);
            }
            StreamEvent::ChapterReplace {
                chapter_id,
                chapter_number,
                title,
                body,
            } => {
                // Flush first so a replacement never races pending fragments.
                let mut state = self.state.lock().unwrap();
                coalescer.flush(&mut state);
                state.replace_section_body(&chapter_id, chapter_number, title.as_deref(), &body);
            }
            StreamEvent::ChapterDone(record) => {
                {
                    let mut state = self.state.lock().unwrap();
                    coalescer.flush(&mut state);
                    state.push_log(format!(
                        "chapter {} done ({} words, {} conflicts)",
                        record.chapter_number, record.word_count, record.p0_count
                    ));
                    state.push_chapter(record.clone());
                }
                self.hooks.notify_chapter_done(&record);
            }
            StreamEvent::Log { message } => {
                self.state.lock().unwrap().push_log(message);
            }
            StreamEvent::Error { detail } => {
                {
                    let mut state = self.state.lock().unwrap();
                    coalescer.flush(&mut state);
                    state.set_error(&detail);
                    state.push_log(format!("generation error: {}", detail));
                }
                self.hooks.notify_error(&detail);
                return false;
            }
            StreamEvent::Done {
                generated_chapters,
                elapsed_s,
            } => {
                {
                    let mut state = self.state.lock().unwrap();
                    coalescer.flush(&mut state);
                    let chapters = generated_chapters
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    let elapsed = elapsed_s
                        .map(|s| format!("{:.1}s", s))
                        .unwrap_or_else(|| "unknown time".to_string());
                    state.push_log(format!("generation finished: {} chapters in {}", chapters, elapsed));
                }
                self.hooks.notify_finished();
                // Keep reading: trailing events may follow before the server
                // closes the stream.
            }
            StreamEvent::Unknown { name } => {
                self.state
                    .lock()
                    .unwrap()
                    .push_log(format!("unrecognized stream event: {}", name));
            }
        }
        true
    }
}
