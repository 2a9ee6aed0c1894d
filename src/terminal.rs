//! Live terminal view of a generation in progress.
//!
//! The view is an ordered list of display lines. Incoming fragments are folded
//! in by [`reduce`], which either appends a new line or merges the fragment
//! into the last one. Which of the two happens is decided by string prefixes
//! on the fragment and the last line; those checks live in
//! [`classify_fragment`] so the whole heuristic can be tested in one place.

use crate::token_artifacts::looks_like_token_usage;

/// Prefix of every progress line.
pub const LINE_PREFIX: &str = "> ";
/// Prefix of thinking-phase lines. These are never merged.
pub const THINKING_PREFIX: &str = "> Thinking:";
/// Prefix of stop-reason lines.
pub const GENERATION_PREFIX: &str = "> Generation";

/// How the reducer must treat a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentClass {
    /// Always starts a new line.
    ForcedNewLine,
    /// A `"> "` progress fragment that may merge into a like previous line.
    Mergeable,
    /// Anything else: appended as a new line.
    Plain,
}

/// Classify a fragment without looking at the existing lines.
pub fn classify_fragment(fragment: &str, is_new_message: bool) -> FragmentClass {
    if is_new_message
        || fragment.starts_with(THINKING_PREFIX)
        || fragment.starts_with(GENERATION_PREFIX)
        || fragment.contains("completed")
        || fragment.contains("Error:")
    {
        return FragmentClass::ForcedNewLine;
    }
    if fragment.starts_with(LINE_PREFIX) {
        return FragmentClass::Mergeable;
    }
    FragmentClass::Plain
}

/// Whether an existing line can absorb a mergeable fragment.
fn accepts_merge(line: &str) -> bool {
    line.starts_with(LINE_PREFIX) && !line.starts_with(THINKING_PREFIX)
}

/// Fold one fragment into the line list.
///
/// Pure: the input slice is not modified and equal inputs always give equal
/// outputs. When merging, only the leading `>` of the fragment is dropped, so
/// the single space after it becomes the join between the two texts.
pub fn reduce(lines: &[String], fragment: &str, is_new_message: bool) -> Vec<String> {
    let mut next = lines.to_vec();

    match (classify_fragment(fragment, is_new_message), next.last_mut()) {
        (FragmentClass::Mergeable, Some(last)) if accepts_merge(last) => {
            last.push_str(&fragment[1..]);
        }
        _ => next.push(fragment.to_string()),
    }

    next
}

/// Owned terminal state for one generation attempt.
#[derive(Debug, Clone, Default)]
pub struct Terminal {
    lines: Vec<String>,
}

impl Terminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fragment in. Token-count text is dropped before reduction.
    ///
    /// Returns the index of the line that changed, or `None` if the fragment
    /// was filtered out.
    pub fn push(&mut self, fragment: &str, is_new_message: bool) -> Option<usize> {
        if looks_like_token_usage(fragment) {
            return None;
        }
        self.lines = reduce(&self.lines, fragment, is_new_message);
        self.lines.len().checked_sub(1)
    }

    /// Push a `"> "`-prefixed progress notice as its own line.
    pub fn notice(&mut self, text: &str) -> Option<usize> {
        self.push(&format!("{}{}", LINE_PREFIX, text), true)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    pub fn reset(&mut self) {
        self.lines.clear();
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_keeps_one_space() {
        let out = reduce(&lines(&["> Hello"]), "> World", false);
        assert_eq!(out, lines(&["> Hello World"]));
    }

    #[test]
    fn test_streamed_continuations_join_with_space() {
        // Each merged delta keeps the space after its marker, so adjacent
        // deltas are shown space-separated even when the content is not.
        let mut term = Terminal::new();
        term.push("> <p>hi", false);
        term.push("> </p>", false);
        assert_eq!(term.lines(), &lines(&["> <p>hi </p>"])[..]);
    }

    #[test]
    fn test_new_message_never_merges() {
        let out = reduce(&lines(&["> Hello"]), "> World", true);
        assert_eq!(out, lines(&["> Hello", "> World"]));
    }

    #[test]
    fn test_thinking_line_not_merged_into() {
        let out = reduce(&lines(&["> Thinking: plan"]), "> more", false);
        assert_eq!(out, lines(&["> Thinking: plan", "> more"]));
    }

    #[test]
    fn test_thinking_fragment_forced_new() {
        let out = reduce(&lines(&["> abc"]), "> Thinking: hmm", false);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_forced_markers() {
        assert_eq!(classify_fragment("> Generation end_turn", false), FragmentClass::ForcedNewLine);
        assert_eq!(classify_fragment("> Content generation completed!", false), FragmentClass::ForcedNewLine);
        assert_eq!(classify_fragment("> Error: boom", false), FragmentClass::ForcedNewLine);
        assert_eq!(classify_fragment("> x", false), FragmentClass::Mergeable);
        assert_eq!(classify_fragment("plain", false), FragmentClass::Plain);
        assert_eq!(classify_fragment("plain", true), FragmentClass::ForcedNewLine);
    }

    #[test]
    fn test_plain_fragment_appends() {
        let out = reduce(&lines(&["> a"]), "plain", false);
        assert_eq!(out, lines(&["> a", "plain"]));
    }

    #[test]
    fn test_mergeable_into_plain_line_appends() {
        let out = reduce(&lines(&["plain"]), "> a", false);
        assert_eq!(out, lines(&["plain", "> a"]));
    }

    #[test]
    fn test_empty_start() {
        let out = reduce(&[], "> a", false);
        assert_eq!(out, lines(&["> a"]));
    }

    #[test]
    fn test_reduce_is_pure() {
        let input = lines(&["> a"]);
        let _ = reduce(&input, "> b", false);
        assert_eq!(input, lines(&["> a"]));
    }

    #[test]
    fn test_replay_deterministic() {
        let seq = [
            ("> Starting generation...", true),
            ("> Thinking: layout", false),
            ("> <div", false),
            ("> class=\"x\">", false),
            ("> Generation end_turn", false),
            ("> tail", false),
            ("> Content generation completed!", true),
        ];
        let run = || {
            seq.iter()
                .fold(Vec::new(), |acc, (f, n)| reduce(&acc, f, *n))
        };
        assert_eq!(run(), run());
        assert_eq!(
            run(),
            lines(&[
                "> Starting generation...",
                "> Thinking: layout",
                "> <div class=\"x\">",
                "> Generation end_turn tail",
                "> Content generation completed!",
            ])
        );
    }

    #[test]
    fn test_terminal_filters_token_text() {
        let mut term = Terminal::new();
        assert_eq!(term.notice("Starting"), Some(0));
        assert_eq!(term.push("> 100 input, 200 output", false), None);
        assert_eq!(term.lines(), &lines(&["> Starting"])[..]);
    }

    #[test]
    fn test_terminal_reset() {
        let mut term = Terminal::new();
        term.notice("x");
        term.reset();
        assert!(term.lines().is_empty());
        assert!(term.last().is_none());
    }
}
