//! Incremental assembly of one SSE generation stream.
//!
//! ```text
//! bytes ──► LineDecoder ──► parse_line ──► StreamAssembler::apply
//!                                              │
//!                               ┌──────────────┼───────────────┐
//!                        ContentAccumulator  Terminal      token usage
//! ```

use tracing::{debug, warn};

use super::accumulator::ContentAccumulator;
use super::decoder::LineDecoder;
use super::event::{parse_line, BlockDelta, ParsedEvent, ParsedLine, StreamEvent, Usage};
use crate::error::{GenerationError, Result};
use crate::terminal::{Terminal, THINKING_PREFIX};

/// What one call to [`StreamAssembler::feed`] produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedOutcome {
    /// The `[DONE]` sentinel was seen.
    pub done: bool,
    /// Indices of terminal lines added or changed, in order, deduplicated.
    pub changed_lines: Vec<usize>,
    /// Content text fragments appended during this call.
    pub tokens: Vec<String>,
}

impl FeedOutcome {
    fn touch(&mut self, index: Option<usize>) {
        if let Some(i) = index {
            if self.changed_lines.last() != Some(&i) {
                self.changed_lines.push(i);
            }
        }
    }
}

/// Everything one stream produced once it has ended.
#[derive(Debug, Clone, Default)]
pub struct AssembledStream {
    pub content: String,
    pub thinking: String,
    pub usage: Usage,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    /// A `message_stop` event was seen.
    pub completed: bool,
    pub terminal: Vec<String>,
}

/// Stateful consumer of one generation stream.
///
/// Owned by exactly one attempt. Feed it body chunks in arrival order; it
/// never reorders fragments.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: LineDecoder,
    content: ContentAccumulator,
    terminal: Terminal,
    thinking: String,
    last_thinking: Option<String>,
    usage: Usage,
    model: Option<String>,
    stop_reason: Option<String>,
    completed: bool,
    done: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing terminal view (e.g. lines shown before the
    /// request was sent).
    pub fn with_terminal(terminal: Terminal) -> Self {
        Self {
            terminal,
            ..Self::default()
        }
    }

    /// Feed one raw body chunk.
    ///
    /// Malformed lines are skipped. An `error` event carrying a message fails
    /// the stream with [`GenerationError::Stream`]. Lines after `[DONE]` are
    /// ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<FeedOutcome> {
        let mut out = FeedOutcome::default();

        for line in self.decoder.decode(chunk) {
            if self.done {
                break;
            }
            match parse_line(&line) {
                None | Some(ParsedLine::Skipped) => {}
                Some(ParsedLine::Done) => self.done = true,
                Some(ParsedLine::Event(event)) => self.apply(event, &mut out)?,
            }
        }

        out.done = self.done;
        Ok(out)
    }

    fn apply(&mut self, parsed: ParsedEvent, out: &mut FeedOutcome) -> Result<()> {
        let ParsedEvent {
            event,
            usage,
            thinking,
            compat_text,
        } = parsed;

        if let Some(u) = usage {
            self.merge_usage(u);
        }
        if let Some(t) = thinking {
            self.push_thinking(&t, out);
        }

        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(info) = message {
                    if let Some(u) = info.usage {
                        self.merge_usage(u);
                    }
                    self.model = info.model;
                }
                out.touch(self.terminal.notice("Starting generation..."));
            }
            StreamEvent::ContentBlockStart { content_block, .. } => {
                if content_block.kind == "thinking" {
                    out.touch(self.terminal.notice("Thinking phase started"));
                } else if let Some(text) = content_block.text.filter(|t| !t.is_empty()) {
                    self.push_content(&text, out);
                }
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                BlockDelta::TextDelta { text: Some(text) } => self.push_content(&text, out),
                BlockDelta::ThinkingDelta {
                    thinking: Some(thinking),
                } => self.push_thinking(&thinking, out),
                _ => {}
            },
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(u) = usage {
                    self.merge_usage(u);
                }
                if let Some(reason) = delta.and_then(|d| d.stop_reason) {
                    out.touch(self.terminal.notice(&format!("Generation {}", reason)));
                    self.stop_reason = Some(reason);
                }
            }
            StreamEvent::MessageStop => {
                self.completed = true;
                out.touch(self.terminal.notice("Content generation completed!"));
            }
            StreamEvent::Error { error } => {
                let (kind, message) = match error {
                    Some(body) => (body.kind, body.message),
                    None => (None, None),
                };
                match message {
                    Some(message) => {
                        out.touch(self.terminal.notice(&format!("Error: {}", message)));
                        return Err(GenerationError::Stream {
                            kind: kind.unwrap_or_else(|| "error".to_string()),
                            message,
                        });
                    }
                    None => debug!("ignoring error event without a message"),
                }
            }
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping | StreamEvent::TokenUsage => {}
            StreamEvent::Unknown => {
                if let Some(text) = compat_text.filter(|t| !t.is_empty()) {
                    self.push_content(&text, out);
                }
            }
        }

        Ok(())
    }

    fn push_content(&mut self, fragment: &str, out: &mut FeedOutcome) {
        for update in self.content.push_text(fragment) {
            out.touch(self.terminal.push(&update.text, update.new_message));
        }
        out.tokens.push(fragment.to_string());
    }

    /// Thinking text is shown once per distinct value; a repeat of the
    /// previous value is dropped.
    fn push_thinking(&mut self, text: &str, out: &mut FeedOutcome) {
        if text.trim().is_empty() {
            return;
        }
        if self.last_thinking.as_deref() == Some(text) {
            return;
        }
        self.thinking.push_str(text);
        let line = format!("{} {}", THINKING_PREFIX, text);
        out.touch(self.terminal.push(&line, true));
        self.last_thinking = Some(text.to_string());
    }

    fn merge_usage(&mut self, usage: Usage) {
        if usage.input_tokens.is_some() {
            self.usage.input_tokens = usage.input_tokens;
        }
        if usage.output_tokens.is_some() {
            self.usage.output_tokens = usage.output_tokens;
        }
    }

    /// Content accumulated so far; what survives if the stream breaks.
    pub fn content(&self) -> &str {
        self.content.content()
    }

    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// Add a progress notice outside the event flow (retries, errors).
    pub fn notice(&mut self, text: &str) -> Option<usize> {
        self.terminal.notice(text)
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Close the stream and hand over what was assembled.
    ///
    /// An unterminated trailing line is discarded, not parsed.
    pub fn finish(mut self) -> AssembledStream {
        if let Some(tail) = self.decoder.take_pending() {
            if !tail.trim().is_empty() {
                warn!(bytes = tail.len(), "discarding unterminated SSE line at end of stream");
            }
        }
        AssembledStream {
            content: self.content.into_content(),
            thinking: self.thinking,
            usage: self.usage,
            model: self.model,
            stop_reason: self.stop_reason,
            completed: self.completed,
            terminal: self.terminal.into_lines(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(events: &[&str]) -> Vec<u8> {
        events
            .iter()
            .map(|e| format!("data: {}\n\n", e))
            .collect::<String>()
            .into_bytes()
    }

    fn text_delta(text: &str) -> String {
        serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": text}
        })
        .to_string()
    }

    fn thinking_delta(text: &str) -> String {
        serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "thinking_delta", "thinking": text}
        })
        .to_string()
    }

    #[test]
    fn test_full_anthropic_stream() {
        let body = sse(&[
            r#"{"type":"message_start","message":{"model":"claude-3-7","usage":{"input_tokens":25,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            &text_delta("<p>hi"),
            &text_delta("</p>"),
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":12}}"#,
            r#"{"type":"message_stop"}"#,
            "[DONE]",
        ]);

        let mut asm = StreamAssembler::new();
        let out = asm.feed(&body).unwrap();
        assert!(out.done);
        assert_eq!(out.tokens, vec!["<p>hi", "</p>"]);

        let result = asm.finish();
        assert_eq!(result.content, "<p>hi</p>");
        assert!(result.completed);
        assert_eq!(result.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(result.model.as_deref(), Some("claude-3-7"));
        assert_eq!(result.usage.input_tokens, Some(25));
        assert_eq!(result.usage.output_tokens, Some(12));
        assert_eq!(
            result.terminal,
            vec![
                "> Starting generation... <p>hi </p>".to_string(),
                "> Generation end_turn".to_string(),
                "> Content generation completed!".to_string(),
            ]
        );
    }

    #[test]
    fn test_thinking_dedup() {
        let body = sse(&[
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#,
            &thinking_delta("planning the grid"),
            &thinking_delta("planning the grid"),
            &thinking_delta("adding controls"),
        ]);
        let mut asm = StreamAssembler::new();
        asm.feed(&body).unwrap();
        let result = asm.finish();
        assert_eq!(
            result.terminal,
            vec![
                "> Thinking phase started".to_string(),
                "> Thinking: planning the grid".to_string(),
                "> Thinking: adding controls".to_string(),
            ]
        );
        assert!(result.content.is_empty());
    }

    #[test]
    fn test_error_event_fails_stream() {
        let body = sse(&[
            &text_delta("partial"),
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ]);
        let mut asm = StreamAssembler::new();
        let err = asm.feed(&body).unwrap_err();
        assert!(matches!(err, GenerationError::Stream { ref kind, .. } if kind == "overloaded_error"));
        assert_eq!(asm.content(), "partial");
        assert_eq!(asm.terminal().last(), Some("> Error: Overloaded"));
    }

    #[test]
    fn test_error_event_without_message_ignored() {
        let body = sse(&[r#"{"type":"error"}"#, &text_delta("ok")]);
        let mut asm = StreamAssembler::new();
        assert!(asm.feed(&body).is_ok());
        assert_eq!(asm.content(), "ok");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let mut body = b"data: {not json}\n".to_vec();
        body.extend(sse(&[&text_delta("after")]));
        let mut asm = StreamAssembler::new();
        asm.feed(&body).unwrap();
        assert_eq!(asm.content(), "after");
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let body = sse(&[&text_delta("alpha\nbeta"), &text_delta(" gamma"), "[DONE]"]);

        let mut whole = StreamAssembler::new();
        whole.feed(&body).unwrap();
        let whole = whole.finish();

        let mut pieces = StreamAssembler::new();
        for chunk in body.chunks(7) {
            pieces.feed(chunk).unwrap();
        }
        let pieces = pieces.finish();

        assert_eq!(whole.content, "alpha\nbeta gamma");
        assert_eq!(whole.content, pieces.content);
        assert_eq!(whole.terminal, pieces.terminal);
    }

    #[test]
    fn test_token_usage_event_not_displayed() {
        let body = sse(&[
            r#"{"type":"token_usage","usage":{"inputTokens":100,"outputTokens":250}}"#,
            &text_delta("x"),
        ]);
        let mut asm = StreamAssembler::new();
        asm.feed(&body).unwrap();
        assert_eq!(asm.usage().input_tokens, Some(100));
        assert_eq!(asm.usage().output_tokens, Some(250));
        assert_eq!(asm.terminal().lines(), &["> x".to_string()][..]);
    }

    #[test]
    fn test_leaked_token_text_filtered_from_terminal() {
        let body = sse(&[&text_delta("1200 input, 3400 output")]);
        let mut asm = StreamAssembler::new();
        asm.feed(&body).unwrap();
        assert!(asm.terminal().lines().is_empty());
        // The raw buffer still holds it; it is stripped before normalization.
        assert_eq!(asm.content(), "1200 input, 3400 output");
    }

    #[test]
    fn test_lines_after_done_ignored() {
        let body = sse(&["[DONE]", &text_delta("late")]);
        let mut asm = StreamAssembler::new();
        let out = asm.feed(&body).unwrap();
        assert!(out.done);
        assert!(asm.content().is_empty());
    }

    #[test]
    fn test_bare_usage_and_thinking_fields() {
        let body = sse(&[r#"{"type":"ping","usage":{"output_tokens":3}}"#, r#"{"thinking":"hmm"}"#]);
        let mut asm = StreamAssembler::new();
        asm.feed(&body).unwrap();
        assert_eq!(asm.usage().output_tokens, Some(3));
        assert_eq!(asm.terminal().last(), Some("> Thinking: hmm"));
    }

    #[test]
    fn test_unterminated_final_line_dropped() {
        let mut body = sse(&[&text_delta("kept")]);
        body.extend(format!("data: {}", text_delta(" lost")).into_bytes());
        let mut asm = StreamAssembler::new();
        asm.feed(&body).unwrap();
        let result = asm.finish();
        assert_eq!(result.content, "kept");
    }
}
