use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::types::TokenUsage;

/// Map a configured log level name to a tracing filter directive.
///
/// Returns `None` for `DISABLED`.
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `RUST_LOG`, when set, takes precedence. Calling this twice is harmless.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Log token usage and duration of a finished generation.
pub fn log_generation_complete(game_id: &str, usage: &TokenUsage, attempts: u32, elapsed: Duration) {
    info!(
        game_id,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        estimated = usage.estimated,
        attempts,
        elapsed_ms = elapsed.as_millis() as u64,
        "generation complete"
    );
}
