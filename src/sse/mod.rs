//! SSE (Server-Sent Events) stream decoding.
//!
//! The studio backend streams generation progress as SSE records:
//! - `event: <name>` - event name line (last one wins)
//! - `data: <json>` - data payload line(s), joined with newlines
//! - Empty line - end of record
//! - Lines starting with `:` - comments (ignored)
//!
//! # Module structure
//! - `frames` - byte-level decoding into `(event, payload)` frames
//! - `events` - typed `StreamEvent` decoding with defensive field coercion

mod events;
mod frames;

pub use events::StreamEvent;
pub use frames::{Frame, FrameDecoder, DEFAULT_EVENT};
