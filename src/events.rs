//! Event system for generation lifecycle and streaming hooks.
//!
//! Provides an optional, non-intrusive way to observe a generation.
//! The orchestrator emits events when an attempt starts, when content
//! arrives, when a terminal line changes, and when the generation ends.
//! Implement [`EventHandler`] to drive a progress UI or a log sink.

use std::sync::Arc;

/// Events emitted during a generation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A generation has started.
    GenerationStart {
        /// Game id, if revising an existing game.
        game_id: Option<String>,
        /// Name of the backend serving the request.
        backend: &'static str,
    },
    /// An attempt (first try or retry) is starting.
    AttemptStart {
        /// 1-indexed attempt number.
        attempt: u32,
        /// Total attempts allowed.
        max_attempts: u32,
    },
    /// A content fragment was appended.
    Token {
        /// The fragment text.
        chunk: String,
    },
    /// A terminal line was appended or replaced.
    TerminalLine {
        /// Index of the line in the terminal log.
        index: usize,
        /// Current text of that line.
        line: String,
    },
    /// A failed attempt will be retried.
    TransportRetry {
        /// 1-indexed attempt number that failed.
        attempt: u32,
        /// Delay before the next attempt in milliseconds.
        delay_ms: u64,
        /// Error description.
        reason: String,
    },
    /// Retries ran out but partial content was long enough to use.
    PartialRecovery {
        /// Length of the recovered content in characters.
        chars: usize,
    },
    /// Token usage was written to the store.
    TokenUsageRecorded {
        input_tokens: u64,
        output_tokens: u64,
        /// Whether either count was estimated from text length.
        estimated: bool,
    },
    /// The generation has finished.
    GenerationEnd {
        /// Whether a result was produced.
        ok: bool,
        /// Attempts made.
        attempts: u32,
    },
}

/// Handler for generation lifecycle events.
///
/// This is entirely optional -- generation works without an event handler.
///
/// # Example
///
/// ```
/// use artifact_forge::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::TerminalLine { line, .. } => println!("{}", line),
///             Event::GenerationEnd { ok, .. } => println!("[end] ok={}", ok),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the orchestrator emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use artifact_forge::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Token { chunk } = event {
///         print!("{}", chunk);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_without_handler_is_noop() {
        emit(&None, Event::Token { chunk: "x".into() });
    }

    #[test]
    fn test_fn_handler_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Option<Arc<dyn EventHandler>> =
            Some(Arc::new(FnEventHandler(move |e: Event| sink.lock().unwrap().push(e))));

        emit(&handler, Event::AttemptStart { attempt: 1, max_attempts: 3 });
        emit(&handler, Event::GenerationEnd { ok: true, attempts: 1 });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], Event::AttemptStart { attempt: 1, .. }));
        assert!(matches!(seen[1], Event::GenerationEnd { ok: true, .. }));
    }
}
