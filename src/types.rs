//! Domain records shared between the orchestrator and the storage collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who can see a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Unlisted,
    Public,
}

/// Which provider path a generation takes.
///
/// Anthropic models stream SSE events; Groq is the fast path and answers
/// with a single JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    #[default]
    Anthropic,
    AnthropicThinking,
    Groq,
}

impl ModelType {
    /// Whether this model is consumed as an SSE stream.
    pub fn is_streaming(self) -> bool {
        !matches!(self, ModelType::Groq)
    }

    /// Whether a thinking block is requested from the provider.
    pub fn wants_thinking(self) -> bool {
        matches!(self, ModelType::AnthropicThinking)
    }

    /// Wire name, as sent in the `modelType` field.
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Anthropic => "anthropic",
            ModelType::AnthropicThinking => "anthropic-thinking",
            ModelType::Groq => "groq",
        }
    }
}

/// A generated artifact and its current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub prompt: String,
    pub code: String,
    pub current_version: u32,
    pub visibility: Visibility,
    pub model_type: ModelType,
}

/// Immutable snapshot of a game's code at one point in its history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameVersion {
    pub id: String,
    pub game_id: String,
    pub version_number: u32,
    pub code: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
}

/// One chat turn that requested a revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMessage {
    pub id: String,
    pub game_id: String,
    pub message: String,
    pub response: Option<String>,
    pub image_url: Option<String>,
    pub model_type: ModelType,
    pub created_at: DateTime<Utc>,
}

/// Token accounting for one `(game_id, message_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsageRecord {
    pub game_id: String,
    pub message_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model_type: ModelType,
    pub prompt: String,
}

/// Token counts for one generation, either provider-reported or estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// `true` when one or both counts came from the length heuristic.
    pub estimated: bool,
}

/// The final, renderable result of one generation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Complete HTML document.
    pub html: String,
    /// Human-readable notes that accompanied the code.
    pub instructions: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_paths() {
        assert!(ModelType::Anthropic.is_streaming());
        assert!(ModelType::AnthropicThinking.wants_thinking());
        assert!(!ModelType::Groq.is_streaming());
        assert!(!ModelType::Groq.wants_thinking());
    }

    #[test]
    fn test_model_type_serde_names() {
        let json = serde_json::to_string(&ModelType::AnthropicThinking).unwrap();
        assert_eq!(json, "\"anthropic-thinking\"");
        let parsed: ModelType = serde_json::from_str("\"groq\"").unwrap();
        assert_eq!(parsed, ModelType::Groq);
        assert_eq!(ModelType::AnthropicThinking.as_str(), "anthropic-thinking");
    }

    #[test]
    fn test_visibility_default() {
        assert_eq!(Visibility::default(), Visibility::Private);
        assert_eq!(serde_json::to_string(&Visibility::Public).unwrap(), "\"public\"");
    }
}
