//! Generate one artifact against a live provider.
//!
//! Run with:
//! `ANTHROPIC_API_KEY=... cargo run --example generate -- "a breakout clone"`
//!
//! Without `ANTHROPIC_API_KEY` the request goes to the generation endpoint at
//! `ARTIFACT_FORGE_URL` (default `http://localhost:3000`).

use artifact_forge::backend::{AnthropicBackend, Backend, GenerationApiBackend};
use artifact_forge::events::{Event, FnEventHandler};
use artifact_forge::observability::init_tracing;
use artifact_forge::store::{GameStore, MemoryStore};
use artifact_forge::types::{Game, ModelType, Visibility};
use artifact_forge::{GenerateParams, GenerationCtx, GeneratorConfig, Orchestrator};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()));

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a bouncing ball with gravity".to_string());

    let (backend, base_url): (Arc<dyn Backend>, String) = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) => (
            Arc::new(AnthropicBackend::new(key)),
            "https://api.anthropic.com".to_string(),
        ),
        Err(_) => (
            Arc::new(GenerationApiBackend::new()),
            std::env::var("ARTIFACT_FORGE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        ),
    };

    let store = Arc::new(MemoryStore::new());
    store
        .insert_game(Game {
            id: "demo".to_string(),
            prompt: prompt.clone(),
            code: String::new(),
            current_version: 0,
            visibility: Visibility::Private,
            model_type: ModelType::Anthropic,
        })
        .await?;

    let ctx = GenerationCtx::builder(base_url)
        .backend(backend)
        .store(store.clone())
        .config(GeneratorConfig::from_env()?)
        .event_handler(Arc::new(FnEventHandler(|event: Event| match event {
            Event::TerminalLine { index, line } => eprintln!("[{:>3}] {}", index, line),
            Event::TransportRetry { attempt, delay_ms, reason } => {
                eprintln!("attempt {} failed ({}), retrying in {} ms", attempt, reason, delay_ms)
            }
            _ => {}
        })))
        .build();

    let outcome = Orchestrator::new(ctx)
        .generate(GenerateParams::new("demo", prompt))
        .await?;

    println!("=== Version {} ===", outcome.version_number);
    println!("{}", outcome.artifact.html);
    println!("\n=== Instructions ===\n{}", outcome.artifact.instructions);
    println!(
        "\ntokens: {} in / {} out{}{}",
        outcome.usage.input_tokens,
        outcome.usage.output_tokens,
        if outcome.usage.estimated { " (estimated)" } else { "" },
        if outcome.partial { ", partial content" } else { "" },
    );

    Ok(())
}
