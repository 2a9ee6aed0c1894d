//! Turning raw model output into a complete HTML document.
//!
//! Models answer in several shapes: a fenced ```` ```html ```` block with prose
//! around it, a bare full document, a bare fragment, or plain markdown-ish
//! text. [`normalize`] maps all of them onto one renderable document and
//! never fails.

use regex::Regex;
use std::sync::LazyLock;

use crate::token_artifacts::strip_token_artifacts;
use crate::types::GeneratedArtifact;

static HTML_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```html(.*?)```").ok());

static ANY_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[a-zA-Z][^>]*>").ok());

const OPEN_FENCE: &str = "```html";

const STYLESHEET: &str = "    body { font-family: system-ui, -apple-system, sans-serif; line-height: 1.6; max-width: 800px; margin: 0 auto; padding: 20px; }
    pre { background: #f4f4f4; padding: 10px; border-radius: 5px; overflow-x: auto; }
    code { font-family: ui-monospace, monospace; }";

const EMPTY_PLACEHOLDER: &str = "<p>No content was generated.</p>";

/// Produce a valid standalone HTML document from raw model text.
///
/// # Examples
///
/// ```
/// use artifact_forge::normalize::normalize;
///
/// let doc = normalize("```html\n<p>hi</p>\n```");
/// assert!(doc.starts_with("<!DOCTYPE html>"));
/// assert!(doc.contains("<p>hi</p>"));
/// assert!(!doc.contains("```"));
/// ```
pub fn normalize(raw: &str) -> String {
    let text = extract_html_block(raw).unwrap_or(raw);

    if is_complete_document(text) {
        return text.to_string();
    }

    if text.trim().is_empty() {
        return wrap_document(EMPTY_PLACEHOLDER);
    }

    if is_html_fragment(text) {
        return wrap_document(text);
    }

    wrap_document(&text_to_html(text))
}

/// Inner text of the first ```` ```html ```` block, trimmed.
///
/// A block whose closing fence never arrived (truncated stream) yields
/// everything after the opening fence. Empty blocks yield `None`.
pub fn extract_html_block(text: &str) -> Option<&str> {
    if let Some(re) = HTML_FENCE.as_ref() {
        if let Some(inner) = re.captures(text).and_then(|c| c.get(1)) {
            let inner = inner.as_str().trim();
            if !inner.is_empty() {
                return Some(inner);
            }
            return None;
        }
    }

    let start = text.find(OPEN_FENCE)? + OPEN_FENCE.len();
    let inner = text[start..].trim();
    (!inner.is_empty()).then_some(inner)
}

/// Whether `text` already is a full document.
pub fn is_complete_document(text: &str) -> bool {
    text.contains("<html") || text.contains("<!DOCTYPE")
}

fn is_html_fragment(text: &str) -> bool {
    let has_tag = ANY_TAG.as_ref().is_some_and(|re| re.is_match(text));
    has_tag && ["<div", "<p", "<span"].iter().any(|t| text.contains(t))
}

/// Convert plain text to HTML: `#` lines become headings, others paragraphs.
///
/// The heading level is the length of the leading `#` run and is not capped.
pub fn text_to_html(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let level = line.chars().take_while(|c| *c == '#').count();
            if level > 0 {
                let heading = line[level..].trim_start();
                format!("<h{level}>{heading}</h{level}>")
            } else {
                format!("<p>{}</p>", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap body markup in the standard document skeleton.
pub fn wrap_document(body: &str) -> String {
    format!(
        "<!DOCTYPE html>
<html lang=\"en\">
<head>
  <meta charset=\"UTF-8\">
  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">
  <title>Generated Content</title>
  <style>
{STYLESHEET}
  </style>
</head>
<body>
  <div class=\"content\">
{body}
  </div>
</body>
</html>"
    )
}

/// Prose the model wrote around its html block, if any.
pub fn extract_instructions(raw: &str) -> Option<String> {
    let start = raw.find(OPEN_FENCE)?;
    let before = raw[..start].trim();
    let after = raw[start + OPEN_FENCE.len()..]
        .find("```")
        .map(|close| raw[start + OPEN_FENCE.len() + close + 3..].trim())
        .unwrap_or("");

    let prose = [before, after]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n");
    (!prose.is_empty()).then_some(prose)
}

/// Build the final artifact from raw accumulated content.
///
/// Leaked token-count text is removed from the instructions only. The
/// document is never rewritten: identifiers like `total_tokens` are
/// ordinary code.
pub fn build_artifact(raw: &str, default_instructions: &str) -> GeneratedArtifact {
    let instructions = extract_instructions(raw)
        .map(|prose| strip_token_artifacts(&prose).trim().to_string())
        .filter(|prose| !prose.is_empty())
        .unwrap_or_else(|| default_instructions.to_string());
    GeneratedArtifact {
        html: normalize(raw),
        instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_block_extraction() {
        let doc = normalize("```html\n<p>hi</p>\n```");
        assert_eq!(doc.matches("<p>hi</p>").count(), 1);
        assert!(!doc.contains('`'));
        assert!(doc.contains("<div class=\"content\">"));
    }

    #[test]
    fn test_fenced_full_document_returned_verbatim() {
        let raw = "Here you go:\n```html\n<!DOCTYPE html>\n<html><body>x</body></html>\n```\nEnjoy!";
        assert_eq!(normalize(raw), "<!DOCTYPE html>\n<html><body>x</body></html>");
    }

    #[test]
    fn test_complete_document_unchanged() {
        let doc = "<html><body><canvas></canvas></body></html>";
        assert_eq!(normalize(doc), doc);
    }

    #[test]
    fn test_idempotent_on_documents() {
        for input in [
            "<!DOCTYPE html><html><body>a</body></html>",
            "<p>fragment</p>",
            "# Title\nbody",
            "",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_fragment_wrapped() {
        let doc = normalize("<div id=\"game\"></div>");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<meta charset=\"UTF-8\">"));
        assert!(doc.contains("<meta name=\"viewport\""));
        assert!(doc.contains("<div id=\"game\"></div>"));
    }

    #[test]
    fn test_tags_without_block_elements_treated_as_text() {
        let doc = normalize("<canvas></canvas>");
        assert!(doc.contains("<p><canvas></canvas></p>"));
    }

    #[test]
    fn test_plain_text_headings() {
        let doc = normalize("# Title\nSome text");
        assert!(doc.contains("<h1>Title</h1>\n<p>Some text</p>"));
    }

    #[test]
    fn test_heading_levels() {
        assert_eq!(text_to_html("### Sub"), "<h3>Sub</h3>");
        assert_eq!(text_to_html("#NoSpace"), "<h1>NoSpace</h1>");
        // Not capped at 6.
        assert_eq!(text_to_html("####### Deep"), "<h7>Deep</h7>");
    }

    #[test]
    fn test_blank_lines_dropped() {
        assert_eq!(text_to_html("a\n\n  \nb"), "<p>a</p>\n<p>b</p>");
    }

    #[test]
    fn test_empty_input_placeholder() {
        let doc = normalize("   ");
        assert!(doc.contains(EMPTY_PLACEHOLDER));
    }

    #[test]
    fn test_empty_fence_falls_through() {
        let doc = normalize("```html\n```");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<p>```html</p>"));
    }

    #[test]
    fn test_unterminated_fence() {
        assert_eq!(
            extract_html_block("```html\n<div>cut off"),
            Some("<div>cut off")
        );
    }

    #[test]
    fn test_instructions_extracted() {
        let raw = "I built a snake game.\n```html\n<div></div>\n```\nUse arrow keys.";
        assert_eq!(
            extract_instructions(raw).as_deref(),
            Some("I built a snake game.\n\nUse arrow keys.")
        );
        assert!(extract_instructions("<div></div>").is_none());
    }

    #[test]
    fn test_build_artifact_strips_tokens() {
        let raw = "```html\n<div>play</div>\n```\n1200 input, 3400 output";
        let artifact = build_artifact(raw, "default");
        assert!(!artifact.html.contains("input"));
        assert_eq!(artifact.instructions, "default");
    }

    #[test]
    fn test_build_artifact_keeps_token_names_in_code() {
        let raw = "Here is the game.\n```html\n<script>\nlet total_tokens = 0;\nconst score = { input_tokens: 5 };\n</script>\n<div>Tokens used: 3</div>\n```\nPress space. Tokens used: 812";
        let artifact = build_artifact(raw, "default");
        assert!(artifact.html.contains("let total_tokens = 0;"));
        assert!(artifact.html.contains("const score = { input_tokens: 5 };"));
        assert!(artifact.html.contains("<div>Tokens used: 3</div>"));
        assert_eq!(artifact.instructions, "Here is the game.\n\nPress space.");
    }
}
