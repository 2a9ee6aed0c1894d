//! Prompt composition for generation requests.

use crate::backend::GenerationRequest;

/// System prompt sent to direct provider backends.
pub const SYSTEM_PROMPT: &str = "You are an expert web developer. Produce a single, self-contained \
HTML document with inline CSS and JavaScript that implements the user's request. Wrap the complete \
document in one ```html code block. After the code block, add short plain-text instructions \
explaining how to use the result. Never include token counts or usage statistics in your answer.";

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// Compose the user-turn text for a request.
///
/// A first generation sends the prompt alone. A revision adds the current
/// code and the requested change. A retry after a broken stream also carries
/// the partial output of the failed attempt as a hint.
pub fn build_user_prompt(request: &GenerationRequest) -> String {
    let mut parts = Vec::new();

    match request.current_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => {
            parts.push(section("Original request", &request.prompt));
            parts.push(section("Current code", code));
            parts.push(section("Requested change", &request.message));
        }
        None => parts.push(request.message.clone()),
    }

    if let Some(partial) = request.partial_content.as_deref().filter(|p| !p.is_empty()) {
        parts.push(section(
            "Interrupted attempt",
            &format!(
                "A previous attempt was cut off. Its partial output follows; produce the complete result.\n{}",
                partial
            ),
        ));
    }

    parts.join("\n\n")
}
