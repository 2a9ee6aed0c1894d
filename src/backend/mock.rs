//! Mock backend for testing without a live provider.
//!
//! [`MockBackend`] returns pre-configured [`MockResponse`]s in order, allowing
//! the orchestrator's retry and recovery paths to be tested deterministically.
//!
//! # Example
//!
//! ```
//! use artifact_forge::backend::{MockBackend, MockResponse};
//!
//! let mock = MockBackend::new(vec![
//!     MockResponse::fail("connection reset"),
//!     MockResponse::anthropic_stream(&["```html\n<div>ok</div>\n```"], 10, 5),
//! ]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};

use super::{Backend, GenerationRequest, ResponseBody};
use crate::error::{GenerationError, Result};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// An event stream delivered as these raw chunks.
    Sse(Vec<Vec<u8>>),
    /// A single JSON body.
    Json(Value),
    /// Fail before any body arrives with a network error carrying this message.
    Fail(String),
    /// Fail with a non-success HTTP status.
    Status(u16, String),
    /// Deliver these chunks, then break the stream with a network error.
    SseThenFail(Vec<Vec<u8>>, String),
    /// Deliver these chunks, then never yield again.
    SseThenStall(Vec<Vec<u8>>),
}

impl MockResponse {
    /// A network failure.
    pub fn fail(message: impl Into<String>) -> Self {
        MockResponse::Fail(message.into())
    }

    /// Event stream from complete SSE lines, one chunk per line.
    pub fn sse_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        MockResponse::Sse(
            lines
                .into_iter()
                .map(|l| format!("{}\n", l.as_ref()).into_bytes())
                .collect(),
        )
    }

    /// A well-formed Anthropic stream: `message_start` with the input count,
    /// one `text_delta` per fragment, the output count, `message_stop`, `[DONE]`.
    pub fn anthropic_stream(fragments: &[&str], input_tokens: u64, output_tokens: u64) -> Self {
        MockResponse::sse_lines(anthropic_lines(fragments, input_tokens, output_tokens))
    }

    /// Text fragments as `text_delta` lines followed by a network failure.
    pub fn broken_stream(fragments: &[&str], message: impl Into<String>) -> Self {
        let chunks = fragments
            .iter()
            .map(|f| format!("{}\n", text_delta_line(f)).into_bytes())
            .collect();
        MockResponse::SseThenFail(chunks, message.into())
    }

    /// A JSON body shaped like the generation endpoint's `{content, usage}`.
    pub fn json_content(content: &str, input_tokens: u64, output_tokens: u64) -> Self {
        MockResponse::Json(json!({
            "content": content,
            "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens}
        }))
    }
}

/// A `data: ` line carrying one text delta.
pub fn text_delta_line(text: &str) -> String {
    format!(
        "data: {}",
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})
    )
}

/// The SSE lines of a complete Anthropic message.
pub fn anthropic_lines(fragments: &[&str], input_tokens: u64, output_tokens: u64) -> Vec<String> {
    let mut lines = vec![format!(
        "data: {}",
        json!({"type": "message_start", "message": {"model": "mock", "usage": {"input_tokens": input_tokens}}})
    )];
    lines.extend(fragments.iter().map(|f| text_delta_line(f)));
    lines.push(format!(
        "data: {}",
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": output_tokens}})
    ));
    lines.push(format!("data: {}", json!({"type": "message_stop"})));
    lines.push("data: [DONE]".to_string());
    lines
}

/// A test backend that returns scripted responses in order.
///
/// Cycles back to the beginning when all responses have been consumed.
/// Every request it receives is recorded for later inspection.
#[derive(Debug)]
pub struct MockBackend {
    responses: Vec<MockResponse>,
    index: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockBackend {
    /// Create a mock backend with the given scripted responses.
    ///
    /// An empty script answers every call with a network failure.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: MockResponse) -> Self {
        Self::new(vec![response])
    }

    /// Number of `send` calls so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_response(&self) -> Option<MockResponse> {
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        if self.responses.is_empty() {
            return None;
        }
        Some(self.responses[idx % self.responses.len()].clone())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn send(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &GenerationRequest,
    ) -> Result<ResponseBody> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let response = self
            .next_response()
            .unwrap_or_else(|| MockResponse::fail("mock backend has no responses"));

        match response {
            MockResponse::Sse(chunks) => Ok(ResponseBody::EventStream(
                stream::iter(chunks.into_iter().map(Ok)).boxed(),
            )),
            MockResponse::Json(value) => Ok(ResponseBody::Json(value)),
            MockResponse::Fail(message) => Err(GenerationError::Network(message)),
            MockResponse::Status(status, body) => Err(GenerationError::HttpError {
                status,
                body,
                retry_after: None,
            }),
            MockResponse::SseThenFail(chunks, message) => {
                let tail = stream::once(async move { Err(GenerationError::Network(message)) });
                Ok(ResponseBody::EventStream(
                    stream::iter(chunks.into_iter().map(Ok)).chain(tail).boxed(),
                ))
            }
            MockResponse::SseThenStall(chunks) => Ok(ResponseBody::EventStream(
                stream::iter(chunks.into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
