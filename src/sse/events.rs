//! Typed stream events decoded from wire frames.
//!
//! The wire payloads are loosely typed JSON; every field is coerced
//! defensively here (numeric-or-string, string-or-numeric, with fallbacks)
//! so nothing downstream has to touch `serde_json::Value` again.

use serde_json::Value;

use crate::models::ChapterRecord;
use crate::sse::frames::Frame;

/// One decoded application event from the generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Keep-alive, carries nothing of interest.
    Heartbeat,
    /// The generator is about to stream a new chapter.
    ChapterStart {
        chapter_id: String,
        chapter_number: u32,
        title: String,
    },
    /// A text fragment for an in-progress chapter (`chunk` / `chapter_chunk`).
    ChapterChunk {
        chapter_id: String,
        chapter_number: u32,
        title: Option<String>,
        text: String,
    },
    /// The generator substituted a full replacement body for a chapter.
    ChapterReplace {
        chapter_id: String,
        chapter_number: u32,
        title: Option<String>,
        body: String,
    },
    /// A chapter finished; carries the terminal summary record.
    ChapterDone(ChapterRecord),
    /// Human-readable progress line from the backend.
    Log { message: String },
    /// Upstream-reported generation failure.
    Error { detail: String },
    /// The whole generation run completed.
    Done {
        generated_chapters: Option<u64>,
        elapsed_s: Option<f64>,
    },
    /// Anything we do not recognize; logged, never fatal.
    Unknown { name: String },
}

impl StreamEvent {
    /// Decode a wire frame into a typed event.
    pub fn from_frame(frame: &Frame) -> StreamEvent {
        let p = &frame.payload;
        match frame.event.as_str() {
            "heartbeat" => StreamEvent::Heartbeat,
            "chapter_start" => {
                let chapter_number = field_u32(p, &["chapter_number"]).unwrap_or(0);
                StreamEvent::ChapterStart {
                    chapter_id: chapter_id_or_synth(p, chapter_number),
                    chapter_number,
                    title: field_str(p, &["title"]).unwrap_or_default(),
                }
            }
            "chunk" | "chapter_chunk" => {
                let chapter_number = field_u32(p, &["chapter_number"]).unwrap_or(0);
                StreamEvent::ChapterChunk {
                    chapter_id: chapter_id_or_synth(p, chapter_number),
                    chapter_number,
                    title: field_str(p, &["title"]),
                    text: field_str(p, &["chunk", "text", "data"]).unwrap_or_default(),
                }
            }
            "chapter_replace" => {
                let chapter_number = field_u32(p, &["chapter_number"]).unwrap_or(0);
                StreamEvent::ChapterReplace {
                    chapter_id: chapter_id_or_synth(p, chapter_number),
                    chapter_number,
                    title: field_str(p, &["title"]),
                    body: field_str(p, &["body"]).unwrap_or_default(),
                }
            }
            "chapter_done" => {
                let chapter_number = field_u32(p, &["chapter_number"]).unwrap_or(0);
                StreamEvent::ChapterDone(ChapterRecord {
                    id: field_str(p, &["id", "chapter_id"])
                        .unwrap_or_else(|| synth_chapter_id(chapter_number)),
                    chapter_number,
                    title: field_str(p, &["title"]).unwrap_or_default(),
                    status: field_str(p, &["status"]).unwrap_or_else(|| "draft".to_string()),
                    word_count: field_u64(p, &["word_count"]).unwrap_or(0),
                    p0_count: field_u64(p, &["p0_count"]).unwrap_or(0),
                })
            }
            "log" => StreamEvent::Log {
                message: field_str(p, &["message", "detail", "raw"]).unwrap_or_default(),
            },
            "error" => StreamEvent::Error {
                detail: field_str(p, &["detail", "message", "raw"])
                    .unwrap_or_else(|| "generation failed".to_string()),
            },
            "done" => StreamEvent::Done {
                generated_chapters: field_u64(p, &["generated_chapters"]),
                elapsed_s: field_f64(p, &["elapsed_s"]),
            },
            other => StreamEvent::Unknown {
                name: other.to_string(),
            },
        }
    }
}

fn synth_chapter_id(chapter_number: u32) -> String {
    format!("chapter-{}", chapter_number)
}

fn chapter_id_or_synth(payload: &Value, chapter_number: u32) -> String {
    field_str(payload, &["chapter_id", "id"])
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| synth_chapter_id(chapter_number))
}

/// First present key wins. Strings pass through, numbers stringify.
fn field_str(payload: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match payload.get(key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn field_u64(payload: &Value, keys: &[&str]) -> Option<u64> {
    for key in keys {
        match payload.get(key) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_u64() {
                    return Some(v);
                }
                if let Some(v) = n.as_f64() {
                    return Some(v.max(0.0) as u64);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(v) = s.trim().parse::<u64>() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}

fn field_u32(payload: &Value, keys: &[&str]) -> Option<u32> {
    field_u64(payload, keys).map(|v| v.min(u32::MAX as u64) as u32)
}

fn field_f64(payload: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match payload.get(key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(v) = s.trim().parse::<f64>() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}
