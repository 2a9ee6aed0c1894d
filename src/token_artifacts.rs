//! Detection and removal of leaked token-count text.
//!
//! Some providers echo usage information into the text stream
//! (`"1200 input, 3400 output"`, `"Input tokens: 12"`). These strings must
//! never reach the terminal view or the final document.

use regex::Regex;
use std::sync::LazyLock;

/// One named token-artifact pattern.
pub struct TokenPattern {
    pub name: &'static str,
    pub regex: Regex,
}

/// Every pattern the filter knows about, in match order.
pub static TOKEN_PATTERNS: LazyLock<Vec<TokenPattern>> = LazyLock::new(|| {
    [
        ("input_output_pair", r"(?i)\b\d+\s*input(?:\s+tokens?)?\s*,\s*\d+\s*output(?:\s+tokens?)?"),
        ("input_tokens_label", r"(?i)\binput[\s_]+tokens?\s*[:=]\s*\d+"),
        ("output_tokens_label", r"(?i)\boutput[\s_]+tokens?\s*[:=]\s*\d+"),
        ("total_tokens_label", r"(?i)\btotal[\s_]+tokens?\s*[:=]\s*\d+"),
        ("tokens_used", r"(?i)\btokens?\s+used\s*[:=]?\s*\d+"),
        ("json_token_field", r#""(?:input|output)_?[tT]okens"\s*:\s*\d+"#),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| {
        Regex::new(pattern)
            .ok()
            .map(|regex| TokenPattern { name, regex })
    })
    .collect()
});

/// Whether `text` contains any token-count artifact.
pub fn looks_like_token_usage(text: &str) -> bool {
    TOKEN_PATTERNS.iter().any(|p| p.regex.is_match(text))
}

/// Remove token-count artifacts from `text`.
///
/// Lines that consist of nothing but an artifact (plus punctuation such as
/// brackets or separators) are dropped entirely; otherwise only the matched
/// span is removed and the rest of the line kept.
pub fn strip_token_artifacts(text: &str) -> String {
    if !looks_like_token_usage(text) {
        return text.to_string();
    }

    let mut kept = Vec::new();
    for line in text.split('\n') {
        if !looks_like_token_usage(line) {
            kept.push(line.to_string());
            continue;
        }
        let mut cleaned = line.to_string();
        for pattern in TOKEN_PATTERNS.iter() {
            cleaned = pattern.regex.replace_all(&cleaned, "").into_owned();
        }
        if is_residue(&cleaned) {
            continue;
        }
        kept.push(cleaned.trim_end().to_string());
    }
    kept.join("\n")
}

fn is_residue(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_whitespace() || "()[]{}<>|,;:.-–—*_#/\"'".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(name: &str) -> &'static Regex {
        &TOKEN_PATTERNS
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("missing pattern {}", name))
            .regex
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(TOKEN_PATTERNS.len(), 6);
    }

    #[test]
    fn test_input_output_pair() {
        let re = pattern("input_output_pair");
        assert!(re.is_match("1200 input, 3400 output"));
        assert!(re.is_match("12 input tokens, 34 output tokens"));
        assert!(!re.is_match("input, output"));
    }

    #[test]
    fn test_input_tokens_label() {
        let re = pattern("input_tokens_label");
        assert!(re.is_match("Input tokens: 512"));
        assert!(re.is_match("input_tokens=7"));
        assert!(!re.is_match("input tokens are counted"));
    }

    #[test]
    fn test_output_tokens_label() {
        let re = pattern("output_tokens_label");
        assert!(re.is_match("Output Tokens: 9"));
        assert!(!re.is_match("output: 9"));
    }

    #[test]
    fn test_total_tokens_label() {
        let re = pattern("total_tokens_label");
        assert!(re.is_match("Total tokens: 1000"));
    }

    #[test]
    fn test_tokens_used() {
        let re = pattern("tokens_used");
        assert!(re.is_match("Tokens used: 321"));
        assert!(re.is_match("tokens used 321"));
    }

    #[test]
    fn test_json_token_field() {
        let re = pattern("json_token_field");
        assert!(re.is_match(r#"{"input_tokens": 5}"#));
        assert!(re.is_match(r#"{"outputTokens":5}"#));
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "<div>Score: 10</div>\nPress space to jump";
        assert!(!looks_like_token_usage(text));
        assert_eq!(strip_token_artifacts(text), text);
    }

    #[test]
    fn test_strip_whole_line() {
        let text = "<p>hello</p>\n[1200 input, 3400 output]\n<p>bye</p>";
        assert_eq!(strip_token_artifacts(text), "<p>hello</p>\n<p>bye</p>");
    }

    #[test]
    fn test_strip_inline_span() {
        let text = "Done! Tokens used: 55";
        assert_eq!(strip_token_artifacts(text), "Done!");
    }
}
