//! Line buffering for SSE bodies.
//!
//! Network chunks arrive at arbitrary byte offsets. [`LineDecoder`] carries the
//! unterminated tail across calls and yields only complete `\n`-terminated
//! lines, so a `data:` line split over two TCP reads is seen once, whole.

/// Buffered splitter turning raw body chunks into protocol lines.
///
/// Bytes are buffered (not text) so that a multi-byte UTF-8 character split
/// across two chunks is decoded intact.
///
/// # Example
///
/// ```
/// use artifact_forge::stream::LineDecoder;
///
/// let mut decoder = LineDecoder::new();
/// assert!(decoder.decode(b"data: {\"a\"").is_empty());
/// let lines = decoder.decode(b":1}\n");
/// assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Create a new empty decoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed a raw chunk and return every line it completes, in arrival order.
    ///
    /// The returned lines exclude the terminating `\n`. Any trailing partial
    /// line stays buffered for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Text buffered after the last newline.
    pub fn pending(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Drop and return the unterminated tail.
    ///
    /// The stream driver does not parse this: SSE lines are always
    /// newline-terminated, and a dangling tail at end of stream is discarded.
    pub fn take_pending(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(tail)
    }
}
