//! # Artifact Forge
//!
//! Streaming generation of self-contained HTML artifacts from an LLM.
//!
//! A prompt goes to a provider; the answer comes back as a Server-Sent-Events
//! stream (or a single JSON body). This crate reassembles the stream into the
//! generated text, renders a live line-coalescing terminal view of progress,
//! normalizes the text into a complete HTML document, and saves it as the
//! next version of a game. Transient failures are retried, long partial
//! output is kept, and token usage is reconciled to one record per message.
//!
//! ## Core Concepts
//!
//! - **[`StreamAssembler`]**: feeds body chunks through the
//!   [`LineDecoder`](stream::LineDecoder), the event parser and the
//!   [`ContentAccumulator`](stream::ContentAccumulator).
//! - **[`Terminal`]**: the progress view, built with the pure
//!   [`terminal::reduce`] function.
//! - **[`normalize()`]**: raw model text to a valid document. Never fails.
//! - **[`Orchestrator`]**: request, retry, recover, persist, account.
//! - **[`GenerationCtx`]**: HTTP client, [`Backend`](backend::Backend),
//!   [`GameStore`](store::GameStore), config, cancellation, event handler.
//!
//! ## Quick Start
//!
//! ```no_run
//! use artifact_forge::backend::AnthropicBackend;
//! use artifact_forge::store::MemoryStore;
//! use artifact_forge::{GenerateParams, GenerationCtx, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let ctx = GenerationCtx::builder("https://api.anthropic.com")
//!         .backend(Arc::new(AnthropicBackend::new("sk-ant-...")))
//!         .store(store)
//!         .build();
//!
//!     let outcome = Orchestrator::new(ctx)
//!         .generate(GenerateParams::new("game-id", "a snake game"))
//!         .await?;
//!     println!("{}", outcome.artifact.html);
//!     Ok(())
//! }
//! ```
//!
//! ## Assembling a stream by hand
//!
//! ```
//! use artifact_forge::StreamAssembler;
//!
//! let mut assembler = StreamAssembler::new();
//! assembler
//!     .feed(b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n")
//!     .unwrap();
//! assert_eq!(assembler.content(), "hi");
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod locks;
pub mod normalize;
pub mod observability;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod stream;
pub mod terminal;
pub mod token_artifacts;
pub mod tokens;
pub mod types;

pub use backend::{BackoffConfig, MockBackend, MockResponse};
pub use config::GeneratorConfig;
pub use context::{GenerationCtx, GenerationCtxBuilder};
pub use error::{GenerationError, Result};
pub use normalize::normalize;
pub use orchestrator::{GenerateParams, GeneratedContent, GenerationOutcome, Orchestrator};
pub use stream::StreamAssembler;
pub use terminal::Terminal;
pub use types::{GeneratedArtifact, ModelType, TokenUsage};
