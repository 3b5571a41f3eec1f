//! Studio API client for backend communication.
//!
//! Provides the HTTP client used to open one streaming generation call and
//! expose its response body as a stream of decoded wire frames.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::Client;

use crate::cancel::CancelToken;
use crate::models::BookStreamRequest;
use crate::sse::{Frame, FrameDecoder};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Error type for studio client and session operations.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Server returned a non-success status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// A generation session is already running.
    #[error("a generation session is already active")]
    SessionActive,
}

/// Lazy, non-restartable sequence of decoded frames from one response body.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, StudioError>> + Send>>;

/// Client for the studio backend API.
pub struct StudioClient {
    /// Base URL for the studio API.
    pub base_url: String,
    /// Reusable HTTP client.
    client: Client,
}

impl StudioClient {
    /// Create a client with the default base URL.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }

    /// Open one book-generation streaming call.
    ///
    /// Sends a POST to `/api/projects/{id}/one-shot-book/stream` and returns
    /// the response body as a frame stream. The cancel token is checked
    /// before every read; once it is observed the stream ends and the
    /// underlying connection is released.
    pub async fn stream_book(
        &self,
        project_id: &str,
        request: &BookStreamRequest,
        cancel: CancelToken,
    ) -> Result<FrameStream, StudioError> {
        let url = format!(
            "{}/api/projects/{}/one-shot-book/stream",
            self.base_url, project_id
        );

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StudioError::Server { status, message });
        }

        let bytes_stream = response.bytes_stream();

        let frame_stream = stream::unfold(
            (
                bytes_stream,
                FrameDecoder::new(),
                VecDeque::<Frame>::new(),
                cancel,
                false,
            ),
            |(mut bytes_stream, mut decoder, mut ready, cancel, mut at_eof)| async move {
                loop {
                    if let Some(frame) = ready.pop_front() {
                        return Some((Ok(frame), (bytes_stream, decoder, ready, cancel, at_eof)));
                    }
                    if at_eof {
                        return None;
                    }
                    if cancel.is_cancelled() {
                        tracing::debug!("cancellation observed at read boundary");
                        return None;
                    }

                    match bytes_stream.next().await {
                        Some(Ok(chunk)) => {
                            ready.extend(decoder.feed(&chunk));
                        }
                        Some(Err(e)) => {
                            at_eof = true;
                            return Some((
                                Err(StudioError::Http(e)),
                                (bytes_stream, decoder, ready, cancel, at_eof),
                            ));
                        }
                        None => {
                            at_eof = true;
                            if let Some(frame) = decoder.finish() {
                                ready.push_back(frame);
                            }
                        }
                    }
                }
            },
        );

        Ok(Box::pin(frame_stream))
    }
}

impl Default for StudioClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_new_uses_default_base_url() {
        let client = StudioClient::new();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_client_with_custom_base_url() {
        let url = "http://localhost:9999".to_string();
        let client = StudioClient::with_base_url(url.clone());
        assert_eq!(client.base_url, url);
    }

    #[test]
    fn test_server_error_display() {
        let err = StudioError::Server {
            status: 500,
            message: "internal error".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("500"));
        assert!(display.contains("internal error"));
    }

    #[test]
    fn test_session_active_display() {
        assert_eq!(
            StudioError::SessionActive.to_string(),
            "a generation session is already active"
        );
    }

    #[tokio::test]
    async fn test_stream_book_with_unreachable_server() {
        let client = StudioClient::with_base_url("http://127.0.0.1:1".to_string());
        let request = BookStreamRequest::new("test prompt");
        let result = client
            .stream_book("proj-1", &request, CancelToken::new())
            .await;
        assert!(matches!(result, Err(StudioError::Http(_))));
    }
}
