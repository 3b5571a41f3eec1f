//! Streaming consumer for the studio book-generation backend.
//!
//! The backend writes a whole book in one long server-sent-event response:
//! chapter text arrives as tiny fragments interleaved with lifecycle and log
//! events. This crate turns that byte stream into an observable state
//! surface an embedding UI can render — ordered sections with growing
//! bodies, finished chapter records, a bounded log, and a session error —
//! without the UI touching the wire format.
//!
//! The pipeline, bottom to top:
//!
//! - [`sse::FrameDecoder`] cuts raw bytes into wire frames, independent of
//!   how the transport chunked them.
//! - [`sse::StreamEvent`] names each frame and pulls out its fields.
//! - [`coalescer::ChunkCoalescer`] batches text fragments on a short
//!   debounced delay so state merges stay low-frequency.
//! - [`session::SessionController`] drives one session end to end and owns
//!   the shared [`state::StudioState`].
//! - [`plan::parse_section_body`] splits a finished section into narrative
//!   text and the structured chapter plan the generator embeds in it.

pub mod cancel;
pub mod client;
pub mod coalescer;
pub mod models;
pub mod plan;
pub mod session;
pub mod sse;
pub mod state;

pub use cancel::CancelToken;
pub use client::{StudioClient, StudioError};
pub use models::{BookStreamRequest, ChapterRecord, GenerationMode, GenerationScope, Section};
pub use plan::{ParsedSectionBody, PlanDraft, PlanExtractor};
pub use session::{SessionController, SessionHooks};
pub use state::StudioState;
