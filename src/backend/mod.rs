//! Backend trait and the normalized generation request.
//!
//! The [`Backend`] trait abstracts over whatever answers a generation request,
//! translating a [`GenerationRequest`] into a provider HTTP call and handing
//! back either a live SSE byte stream or a single JSON body.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator ──► GenerationRequest ──► Backend::send() ──► ResponseBody
//!                                              │
//!                  ┌───────────────────┬───────┴──────────┬──────────────┐
//!        GenerationApiBackend   AnthropicBackend      GroqBackend    MockBackend
//!          /api/generate          /v1/messages      chat/completions   scripted
//!          SSE or JSON            SSE               JSON only
//! ```

pub mod anthropic;
pub mod backoff;
pub mod generation_api;
pub mod groq;
pub mod mock;

pub use anthropic::AnthropicBackend;
pub use backoff::BackoffConfig;
pub use generation_api::GenerationApiBackend;
pub use groq::GroqBackend;
pub use mock::{MockBackend, MockResponse};

use crate::error::{GenerationError, Result};
use crate::stream::Usage;
use crate::types::ModelType;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// A boxed stream of raw body chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// A normalized generation request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Target game, if this revises an existing one.
    pub game_id: Option<String>,
    /// The game's original prompt.
    pub prompt: String,
    /// This turn's chat message (equals `prompt` on first generation).
    pub message: String,
    pub model_type: ModelType,
    pub image_url: Option<String>,
    /// Ask for an SSE stream.
    pub stream: bool,
    /// Thinking budget in tokens; `None` disables the thinking block.
    pub thinking_budget: Option<u32>,
    /// Latest code of the game being revised.
    pub current_code: Option<String>,
    /// Output of a failed earlier attempt, passed along as a hint.
    pub partial_content: Option<String>,
}

impl GenerationRequest {
    /// A first-generation request for `prompt`.
    pub fn new(prompt: impl Into<String>, model_type: ModelType) -> Self {
        let prompt = prompt.into();
        Self {
            game_id: None,
            message: prompt.clone(),
            prompt,
            model_type,
            image_url: None,
            stream: model_type.is_streaming(),
            thinking_budget: None,
            current_code: None,
            partial_content: None,
        }
    }

    pub fn with_game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_thinking_budget(mut self, tokens: u32) -> Self {
        self.thinking_budget = Some(tokens);
        self
    }
}

/// What a backend answered with.
pub enum ResponseBody {
    /// A `text/event-stream` body, consumed chunk by chunk.
    EventStream(ByteStream),
    /// A single JSON document (`{content, usage?}` or a chat-completion shape).
    Json(Value),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::EventStream(_) => f.write_str("EventStream(..)"),
            ResponseBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
        }
    }
}

/// Abstraction over generation providers.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send the request and return the response body.
    ///
    /// Non-success statuses become [`GenerationError::HttpError`].
    async fn send(
        &self,
        client: &Client,
        base_url: &str,
        request: &GenerationRequest,
    ) -> Result<ResponseBody>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value as seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Map a connect failure to a transient network error.
pub(crate) fn connect_error(url: &str, err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        return GenerationError::Network(format!("timeout connecting to {}: {}", url, err));
    }
    GenerationError::Network(format!("connection to {} failed: {}", url, err))
}

/// Turn an HTTP response into a [`ResponseBody`].
///
/// When a stream was requested but the server did not answer with
/// `text/event-stream`, the body is read whole and treated as JSON. A body
/// that is not JSON but still looks like SSE is replayed as a one-chunk stream.
pub(crate) async fn into_response_body(
    resp: reqwest::Response,
    stream_requested: bool,
) -> Result<ResponseBody> {
    let status = resp.status();

    if !status.is_success() {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = resp.text().await.unwrap_or_default();
        return Err(GenerationError::HttpError {
            status: status.as_u16(),
            body,
            retry_after,
        });
    }

    let is_event_stream = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/event-stream"));

    if stream_requested && is_event_stream {
        let chunks = resp
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| GenerationError::Network(format!("stream interrupted: {}", e)))
            })
            .boxed();
        return Ok(ResponseBody::EventStream(chunks));
    }

    if stream_requested {
        warn!("stream requested but response is not text/event-stream; reading as JSON");
    }

    let text = resp
        .text()
        .await
        .map_err(|e| GenerationError::Network(format!("failed to read response body: {}", e)))?;
    body_from_text(text)
}

/// Interpret a fully-read body: JSON if it parses, SSE replay if it looks like
/// event lines.
pub(crate) fn body_from_text(text: String) -> Result<ResponseBody> {
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Ok(ResponseBody::Json(value)),
        Err(e) => {
            if text.contains("data: ") {
                warn!("response body is SSE without an event-stream content type");
                let once = stream::once(async move { Ok::<_, GenerationError>(text.into_bytes()) }).boxed();
                Ok(ResponseBody::EventStream(once))
            } else {
                Err(GenerationError::Json(e))
            }
        }
    }
}

/// Pull generated text out of a non-streaming JSON body.
///
/// Tries `choices[0].message.content` (OpenAI/Groq), then a string `content`,
/// then Anthropic's `content[0].text`.
pub fn extract_json_content(body: &Value) -> Option<String> {
    if let Some(text) = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }

    match body.get("content") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(blocks)) => {
            let text: String = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

/// Token counts from a non-streaming JSON body, if reported.
pub fn extract_json_usage(body: &Value) -> Usage {
    body.get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        .unwrap_or_default()
}
