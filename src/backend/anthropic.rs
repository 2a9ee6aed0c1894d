//! Backend for the Anthropic Messages API.
//!
//! Streams `message_start` / `content_block_delta` / `message_stop` events
//! from `/v1/messages`, optionally with an extended-thinking block.

use super::generation_api::redact;
use super::{connect_error, into_response_body, Backend, GenerationRequest, ResponseBody};
use crate::error::Result;
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const API_VERSION: &str = "2023-06-01";

/// Direct Anthropic backend.
///
/// # Example
///
/// ```
/// use artifact_forge::backend::AnthropicBackend;
///
/// let backend = AnthropicBackend::new("sk-ant-...").with_max_tokens(16000);
/// ```
#[derive(Clone)]
pub struct AnthropicBackend {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 20000,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    /// Build the `/v1/messages` body.
    fn build_body(&self, request: &GenerationRequest) -> Value {
        let text = build_user_prompt(request);
        let content = match request.image_url {
            Some(ref url) => json!([
                {"type": "image", "source": {"type": "url", "url": url}},
                {"type": "text", "text": text}
            ]),
            None => json!(text),
        };

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{"role": "user", "content": content}],
            "stream": request.stream,
        });

        if let Some(budget) = request.thinking_budget {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }

        body
    }

    fn build_http_request(&self, client: &Client, url: &str, body: &Value) -> reqwest::RequestBuilder {
        client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn send(
        &self,
        client: &Client,
        base_url: &str,
        request: &GenerationRequest,
    ) -> Result<ResponseBody> {
        let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
        let body = self.build_body(request);

        let resp = self
            .build_http_request(client, &url, &body)
            .send()
            .await
            .map_err(|e| connect_error(&url, e))?;

        into_response_body(resp, request.stream).await
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
