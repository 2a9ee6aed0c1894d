//! Backend for the application's own generation endpoint.
//!
//! [`GenerationApiBackend`] posts `{gameId?, prompt, message, modelType, ...}`
//! to `{base}/api/generate`. The endpoint answers with either an SSE stream of
//! Anthropic-shaped events or a JSON `{content, usage?}` document.

use super::{connect_error, into_response_body, Backend, GenerationRequest, ResponseBody};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Default path of the generation endpoint.
pub const DEFAULT_PATH: &str = "/api/generate";

/// Backend for the generation HTTP endpoint.
///
/// # Example
///
/// ```
/// use artifact_forge::backend::GenerationApiBackend;
///
/// let backend = GenerationApiBackend::new().with_api_key("secret-token");
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone)]
pub struct GenerationApiBackend {
    /// Optional bearer token.
    pub(crate) api_key: Option<String>,
    /// Endpoint path appended to the base URL.
    pub(crate) path: String,
}

impl std::fmt::Debug for GenerationApiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationApiBackend")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("path", &self.path)
            .finish()
    }
}

/// Keep a short prefix of a secret for identification.
pub(crate) fn redact(key: &str) -> String {
    match key.char_indices().nth(6) {
        Some((idx, _)) => format!("{}***", &key[..idx]),
        None => "***".to_string(),
    }
}

impl GenerationApiBackend {
    pub fn new() -> Self {
        Self {
            api_key: None,
            path: DEFAULT_PATH.to_string(),
        }
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the endpoint path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the JSON body the endpoint expects.
    fn build_body(request: &GenerationRequest) -> Value {
        let mut body = json!({
            "prompt": request.prompt,
            "message": request.message,
            "modelType": request.model_type.as_str(),
            "stream": request.stream,
        });

        if let Some(ref game_id) = request.game_id {
            body["gameId"] = json!(game_id);
        }
        if let Some(ref url) = request.image_url {
            body["imageUrl"] = json!(url);
        }
        if let Some(budget) = request.thinking_budget {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }
        if let Some(ref code) = request.current_code {
            body["currentCode"] = json!(code);
        }
        if let Some(ref partial) = request.partial_content {
            body["partialContent"] = json!(partial);
        }

        body
    }

    fn build_http_request(&self, client: &Client, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut req = client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if body["stream"] == json!(true) {
            req = req.header("Accept", "text/event-stream");
        }
        req
    }
}

impl Default for GenerationApiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for GenerationApiBackend {
    async fn send(
        &self,
        client: &Client,
        base_url: &str,
        request: &GenerationRequest,
    ) -> Result<ResponseBody> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let body = Self::build_body(request);

        let resp = self
            .build_http_request(client, &url, &body)
            .send()
            .await
            .map_err(|e| connect_error(&url, e))?;

        into_response_body(resp, request.stream).await
    }

    fn name(&self) -> &'static str {
        "generation-api"
    }
}
