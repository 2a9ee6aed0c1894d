//! Replay a captured SSE transcript through the assembler.
//!
//! Run with: `cargo run --example replay_stream -- [transcript.sse] [chunk-size]`
//!
//! Without a file a built-in transcript is used. The body is fed in small
//! chunks to show that line and character boundaries do not matter.

use anyhow::Context;
use artifact_forge::normalize::build_artifact;
use artifact_forge::observability::init_tracing;
use artifact_forge::StreamAssembler;

const BUILT_IN: &str = r#"data: {"type":"message_start","message":{"model":"claude","usage":{"input_tokens":24}}}

data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}

data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"A canvas with a ball."}}

data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"A canvas with a ball."}}

data: {"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}

data: {"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"```html\n<div id=\"ball\">"}}

data: {"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"</div>\n```\nClick to "}}

data: {"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"bounce the ball."}}

data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":31}}

data: {"type":"message_stop"}

data: [DONE]
"#;

fn main() -> anyhow::Result<()> {
    init_tracing("WARNING");

    let mut args = std::env::args().skip(1);
    let transcript = match args.next() {
        Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path))?,
        None => BUILT_IN.as_bytes().to_vec(),
    };
    let chunk_size: usize = match args.next() {
        Some(raw) => raw.parse().with_context(|| format!("invalid chunk size '{}'", raw))?,
        None => 7,
    };

    let mut assembler = StreamAssembler::new();
    for chunk in transcript.chunks(chunk_size.max(1)) {
        let outcome = assembler.feed(chunk)?;
        if outcome.done {
            break;
        }
    }
    let assembled = assembler.finish();

    println!("=== Terminal ===");
    for line in &assembled.terminal {
        println!("{}", line);
    }

    let artifact = build_artifact(&assembled.content, "No instructions.");
    println!("\n=== Document ===\n{}", artifact.html);
    println!("\n=== Instructions ===\n{}", artifact.instructions);
    println!(
        "\nmodel: {}, stop: {}, tokens: {:?} in / {:?} out",
        assembled.model.as_deref().unwrap_or("?"),
        assembled.stop_reason.as_deref().unwrap_or("?"),
        assembled.usage.input_tokens,
        assembled.usage.output_tokens,
    );

    Ok(())
}
