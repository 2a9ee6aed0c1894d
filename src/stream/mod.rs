//! SSE stream consumption: line buffering, event parsing, and assembly.

pub mod accumulator;
pub mod assembler;
pub mod decoder;
pub mod event;

pub use accumulator::{ContentAccumulator, TerminalUpdate};
pub use assembler::{AssembledStream, FeedOutcome, StreamAssembler};
pub use decoder::LineDecoder;
pub use event::{parse_line, ParsedEvent, ParsedLine, StreamEvent, Usage};
