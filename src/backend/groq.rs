//! Backend for Groq's OpenAI-compatible chat completions.
//!
//! This is the fast path: always non-streaming, answered with one JSON body
//! whose text sits at `choices[0].message.content`.

use super::generation_api::redact;
use super::{connect_error, into_response_body, Backend, GenerationRequest, ResponseBody};
use crate::error::Result;
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Non-streaming Groq backend.
#[derive(Clone)]
pub struct GroqBackend {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
}

impl std::fmt::Debug for GroqBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqBackend")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

impl GroqBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build the chat-completions body. `stream` is always `false`.
    fn build_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "stream": false,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(request)}
            ],
        })
    }
}

#[async_trait]
impl Backend for GroqBackend {
    async fn send(
        &self,
        client: &Client,
        base_url: &str,
        request: &GenerationRequest,
    ) -> Result<ResponseBody> {
        let url = format!("{}/openai/v1/chat/completions", base_url.trim_end_matches('/'));
        let body = self.build_body(request);

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| connect_error(&url, e))?;

        into_response_body(resp, false).await
    }

    fn name(&self) -> &'static str {
        "groq"
    }
}
