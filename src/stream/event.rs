//! SSE line classification and provider event types.
//!
//! Each `data: ` line carries either the `[DONE]` sentinel or one JSON event.
//! Anthropic-shaped events are modelled as a tagged enum; provider quirks such
//! as a bare `usage` or `thinking` field on arbitrary events are lifted out of
//! the raw JSON before the typed parse so both shapes are tolerated.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// The SSE data prefix. Lines without it carry no payload.
pub const DATA_PREFIX: &str = "data: ";

/// Sentinel payload that terminates a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Token counts as reported by a provider.
///
/// Accepts the `input_tokens`, `inputTokens`, and OpenAI-style
/// `prompt_tokens` spellings (and their output counterparts).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default, alias = "inputTokens", alias = "prompt_tokens")]
    pub input_tokens: Option<u64>,
    #[serde(default, alias = "outputTokens", alias = "completion_tokens")]
    pub output_tokens: Option<u64>,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none()
    }
}

/// Provider stream events, discriminated by their `type` tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(default)]
        message: Option<MessageInfo>,
    },
    ContentBlockStart {
        #[serde(default)]
        index: Option<u64>,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: Option<u64>,
        delta: BlockDelta,
    },
    ContentBlockStop {
        #[serde(default)]
        index: Option<u64>,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<MessageDeltaBody>,
        #[serde(default)]
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        #[serde(default)]
        error: Option<ErrorBody>,
    },
    /// Non-standard event carrying only token counts.
    TokenUsage,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageInfo {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta {
        #[serde(default)]
        text: Option<String>,
    },
    ThinkingDelta {
        #[serde(default)]
        thinking: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// One decoded event plus the loosely-placed fields some providers attach.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub event: StreamEvent,
    /// Usage found on the event body itself (any event type).
    pub usage: Option<Usage>,
    /// A bare `thinking` string found on the event body.
    pub thinking: Option<String>,
    /// OpenAI-style `choices[0].delta.content` text, for compatible providers.
    pub compat_text: Option<String>,
}

/// Classification of one SSE line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// The `[DONE]` sentinel.
    Done,
    Event(ParsedEvent),
    /// A `data:` line whose payload was not valid JSON. Skipped, not fatal.
    Skipped,
}

/// Classify one protocol line.
///
/// Returns `None` for lines without the `data: ` prefix (comments, `event:`
/// lines, keep-alive blanks).
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();

    if payload == DONE_SENTINEL {
        return Some(ParsedLine::Done);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, line = %truncate(payload, 120), "skipping malformed SSE payload");
            return Some(ParsedLine::Skipped);
        }
    };

    Some(ParsedLine::Event(parse_event_value(value)))
}

/// Decode an already-parsed JSON event.
pub fn parse_event_value(value: Value) -> ParsedEvent {
    let usage = bare_usage(&value);
    let thinking = value
        .get("thinking")
        .and_then(Value::as_str)
        .map(str::to_string);
    let compat_text = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let event = match serde_json::from_value::<StreamEvent>(value) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "unrecognized stream event shape");
            StreamEvent::Unknown
        }
    };

    ParsedEvent {
        event,
        usage,
        thinking,
        compat_text,
    }
}

/// Pull token counts from wherever this provider put them.
///
/// Checks a top-level `usage` object first, then a `token_usage` event that
/// carries the counts directly on its body.
fn bare_usage(value: &Value) -> Option<Usage> {
    if let Some(u) = value.get("usage") {
        if let Ok(usage) = serde_json::from_value::<Usage>(u.clone()) {
            if !usage.is_empty() {
                return Some(usage);
            }
        }
    }
    if value.get("type").and_then(Value::as_str) == Some("token_usage") {
        if let Ok(usage) = serde_json::from_value::<Usage>(value.clone()) {
            if !usage.is_empty() {
                return Some(usage);
            }
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(line: &str) -> ParsedEvent {
        match parse_line(line) {
            Some(ParsedLine::Event(e)) => e,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_non_data_lines_ignored() {
        assert!(parse_line("event: message_start").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line(": keep-alive").is_none());
    }

    #[test]
    fn test_done_sentinel() {
        assert_eq!(parse_line("data: [DONE]"), Some(ParsedLine::Done));
        assert_eq!(parse_line("data: [DONE]\r"), Some(ParsedLine::Done));
    }

    #[test]
    fn test_malformed_json_skipped() {
        assert_eq!(parse_line("data: {\"type\": \"content_bl"), Some(ParsedLine::Skipped));
    }

    #[test]
    fn test_text_delta() {
        let e = event(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#);
        assert_eq!(
            e.event,
            StreamEvent::ContentBlockDelta {
                index: Some(0),
                delta: BlockDelta::TextDelta {
                    text: Some("Hi".into())
                },
            }
        );
    }

    #[test]
    fn test_thinking_delta() {
        let e = event(r#"data: {"type":"content_block_delta","delta":{"type":"thinking_delta","thinking":"hmm"}}"#);
        assert!(matches!(
            e.event,
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::ThinkingDelta { thinking: Some(ref t) },
                ..
            } if t == "hmm"
        ));
    }

    #[test]
    fn test_unknown_delta_kind() {
        let e = event(r#"data: {"type":"content_block_delta","delta":{"type":"signature_delta","signature":"x"}}"#);
        assert!(matches!(
            e.event,
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::Other,
                ..
            }
        ));
    }

    #[test]
    fn test_message_start_usage() {
        let e = event(r#"data: {"type":"message_start","message":{"model":"claude","usage":{"input_tokens":42,"output_tokens":1}}}"#);
        match e.event {
            StreamEvent::MessageStart { message: Some(info) } => {
                assert_eq!(info.usage.and_then(|u| u.input_tokens), Some(42));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_message_delta_stop_reason() {
        let e = event(r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":99}}"#);
        assert_eq!(e.usage.and_then(|u| u.output_tokens), Some(99));
        match e.event {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.and_then(|d| d.stop_reason).as_deref(), Some("end_turn"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_message_stop_and_block_stop() {
        assert_eq!(event(r#"data: {"type":"message_stop"}"#).event, StreamEvent::MessageStop);
        assert!(matches!(
            event(r#"data: {"type":"content_block_stop","index":1}"#).event,
            StreamEvent::ContentBlockStop { index: Some(1) }
        ));
    }

    #[test]
    fn test_error_event() {
        let e = event(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#);
        match e.event {
            StreamEvent::Error { error: Some(body) } => {
                assert_eq!(body.message.as_deref(), Some("Overloaded"));
                assert_eq!(body.kind.as_deref(), Some("overloaded_error"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_token_usage_camel_case() {
        let e = event(r#"data: {"type":"token_usage","usage":{"inputTokens":10,"outputTokens":20}}"#);
        assert_eq!(e.event, StreamEvent::TokenUsage);
        assert_eq!(
            e.usage,
            Some(Usage {
                input_tokens: Some(10),
                output_tokens: Some(20)
            })
        );
    }

    #[test]
    fn test_token_usage_flat_body() {
        let e = event(r#"data: {"type":"token_usage","input_tokens":5,"output_tokens":6}"#);
        assert_eq!(e.usage.and_then(|u| u.output_tokens), Some(6));
    }

    #[test]
    fn test_bare_thinking_field() {
        let e = event(r#"data: {"thinking":"considering layout"}"#);
        assert_eq!(e.event, StreamEvent::Unknown);
        assert_eq!(e.thinking.as_deref(), Some("considering layout"));
    }

    #[test]
    fn test_unknown_type_tolerated() {
        let e = event(r#"data: {"type":"brand_new_event","x":1}"#);
        assert_eq!(e.event, StreamEvent::Unknown);
    }

    #[test]
    fn test_openai_compatible_chunk() {
        let e = event(r#"data: {"choices":[{"delta":{"content":"<div>"}}]}"#);
        assert_eq!(e.compat_text.as_deref(), Some("<div>"));
    }
}
