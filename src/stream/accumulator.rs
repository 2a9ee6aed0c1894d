//! Running content buffer with current-line tracking.

use crate::terminal::LINE_PREFIX;

/// One fragment destined for the terminal view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalUpdate {
    pub text: String,
    /// Forces a new terminal line instead of a possible merge.
    pub new_message: bool,
}

impl TerminalUpdate {
    fn continuation(segment: &str) -> Self {
        Self {
            text: format!("{}{}", LINE_PREFIX, segment),
            new_message: false,
        }
    }

    fn new_line(segment: &str) -> Self {
        Self {
            text: format!("{}{}", LINE_PREFIX, segment),
            new_message: true,
        }
    }
}

/// Append-only content buffer for one generation attempt.
///
/// Tracks the text written since the last newline across the whole stream
/// (not per network chunk), so a line built from many small deltas is shown
/// as one growing terminal line.
#[derive(Debug, Clone, Default)]
pub struct ContentAccumulator {
    content: String,
    current_line: String,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text fragment and return the terminal updates it produces.
    ///
    /// Without a newline the fragment extends the current line as a
    /// continuation. With newlines, the first segment continues the current
    /// line, every middle segment is a new line, and the last segment starts
    /// the next current line and is shown immediately as a new line. A
    /// fragment ending in `\n` leaves the current line empty. Empty segments
    /// produce no update.
    pub fn push_text(&mut self, fragment: &str) -> Vec<TerminalUpdate> {
        self.content.push_str(fragment);

        let mut updates = Vec::new();
        let segments: Vec<&str> = fragment.split('\n').collect();

        let (first, rest) = match segments.split_first() {
            Some(split) => split,
            None => return updates,
        };

        self.current_line.push_str(first);
        if !first.is_empty() {
            updates.push(TerminalUpdate::continuation(first));
        }

        if let Some((last, middle)) = rest.split_last() {
            for segment in middle.iter().filter(|s| !s.is_empty()) {
                updates.push(TerminalUpdate::new_line(segment));
            }
            self.current_line = (*last).to_string();
            if !last.is_empty() {
                updates.push(TerminalUpdate::new_line(last));
            }
        }

        updates
    }

    /// Everything accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Text since the last newline.
    pub fn current_line(&self) -> &str {
        &self.current_line
    }

    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cont(s: &str) -> TerminalUpdate {
        TerminalUpdate {
            text: format!("> {}", s),
            new_message: false,
        }
    }

    fn line(s: &str) -> TerminalUpdate {
        TerminalUpdate {
            text: format!("> {}", s),
            new_message: true,
        }
    }

    #[test]
    fn test_plain_fragment_continues() {
        let mut acc = ContentAccumulator::new();
        assert_eq!(acc.push_text("<div"), vec![cont("<div")]);
        assert_eq!(acc.push_text(" id=a>"), vec![cont(" id=a>")]);
        assert_eq!(acc.current_line(), "<div id=a>");
        assert_eq!(acc.content(), "<div id=a>");
    }

    #[test]
    fn test_newline_split_rule() {
        let mut acc = ContentAccumulator::new();
        acc.push_text("<html");
        let updates = acc.push_text(">\n<head>\n<body>\n<main");
        assert_eq!(
            updates,
            vec![cont(">"), line("<head>"), line("<body>"), line("<main")]
        );
        assert_eq!(acc.current_line(), "<main");
    }

    #[test]
    fn test_trailing_newline_resets_line() {
        let mut acc = ContentAccumulator::new();
        let updates = acc.push_text("abc\n");
        assert_eq!(updates, vec![cont("abc")]);
        assert_eq!(acc.current_line(), "");
    }

    #[test]
    fn test_leading_newline() {
        let mut acc = ContentAccumulator::new();
        acc.push_text("x");
        let updates = acc.push_text("\ny");
        assert_eq!(updates, vec![line("y")]);
        assert_eq!(acc.current_line(), "y");
    }

    #[test]
    fn test_blank_middle_lines_skipped() {
        let mut acc = ContentAccumulator::new();
        let updates = acc.push_text("a\n\n\nb");
        assert_eq!(updates, vec![cont("a"), line("b")]);
        assert_eq!(acc.content(), "a\n\n\nb");
    }

    #[test]
    fn test_len_counts_chars() {
        let mut acc = ContentAccumulator::new();
        acc.push_text("héllo");
        assert_eq!(acc.len(), 5);
        assert!(!acc.is_empty());
    }
}
