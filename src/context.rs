//! Generation context shared across generations.
//!
//! [`GenerationCtx`] carries the HTTP client, backend, store, tuning config,
//! cancellation handle, and optional event handler. Build it once and hand it
//! to an [`Orchestrator`](crate::Orchestrator).

use crate::backend::{Backend, GenerationApiBackend};
use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result};
use crate::events::EventHandler;
use crate::store::{GameStore, MemoryStore};
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tracing::warn;

/// Shared context for generations.
///
/// # Example
///
/// ```
/// use artifact_forge::{GenerationCtx, GeneratorConfig};
///
/// let ctx = GenerationCtx::builder("http://localhost:3000/api/generate")
///     .config(GeneratorConfig::default().with_max_retries(1))
///     .build();
/// assert_eq!(ctx.base_url, "http://localhost:3000");
/// ```
#[derive(Clone)]
pub struct GenerationCtx {
    /// HTTP client (cheap to clone -- uses `Arc` internally).
    pub client: Client,
    /// Base URL of the provider, without API path suffixes.
    pub base_url: String,
    /// Generation backend. Default: [`GenerationApiBackend`].
    pub backend: Arc<dyn Backend>,
    /// Storage collaborator. Default: an empty [`MemoryStore`].
    pub store: Arc<dyn GameStore>,
    pub config: GeneratorConfig,
    /// Optional cancellation flag, checked before each attempt and between chunks.
    pub cancellation: Option<Arc<AtomicBool>>,
    /// Optional event handler for tokens, terminal lines and lifecycle events.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl GenerationCtx {
    /// Create a new builder.
    pub fn builder(base_url: impl Into<String>) -> GenerationCtxBuilder {
        GenerationCtxBuilder {
            client: None,
            base_url: base_url.into(),
            backend: None,
            store: None,
            config: None,
            cancellation: None,
            event_handler: None,
            timeout: None,
        }
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        Ok(())
    }
}

impl std::fmt::Debug for GenerationCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationCtx")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`GenerationCtx`].
pub struct GenerationCtxBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    store: Option<Arc<dyn GameStore>>,
    config: Option<GeneratorConfig>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    timeout: Option<Duration>,
}

impl GenerationCtxBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the backend. Default: [`GenerationApiBackend`].
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the store. Default: an empty [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn GameStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: GeneratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the cancellation flag.
    pub fn cancellation(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancellation = cancel;
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set the connect timeout of the default client. Default: 60 seconds.
    ///
    /// The overall per-attempt budget is [`GeneratorConfig::attempt_timeout`].
    /// Ignored when a custom `Client` is provided via `.client()`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the context.
    pub fn build(self) -> GenerationCtx {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(60));
        let client = self.client.unwrap_or_else(|| {
            Client::builder()
                .connect_timeout(timeout)
                .build()
                .unwrap_or_else(|e| {
                    warn!(error = %e, "failed to build HTTP client, using defaults");
                    Client::new()
                })
        });
        GenerationCtx {
            client,
            base_url: normalize_base_url(&self.base_url),
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(GenerationApiBackend::new())),
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            config: self.config.unwrap_or_default(),
            cancellation: self.cancellation,
            event_handler: self.event_handler,
        }
    }
}

/// Strip known provider path suffixes from a base URL.
/// This prevents double-pathing when backends append their own paths.
/// e.g., "https://api.groq.com/openai/v1" -> "https://api.groq.com"
/// e.g., "http://localhost:3000/api/generate" -> "http://localhost:3000"
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    // Longest first.
    for suffix in &[
        "/openai/v1/chat/completions",
        "/openai/v1",
        "/v1/messages",
        "/api/generate",
        "/v1",
        "/api",
    ] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
