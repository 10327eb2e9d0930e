//! Terminal byte-stream handling.
//!
//! - `parser`: inbound escape-sequence parser producing structured events
//! - `ansi`: control bytes and output sequences for the browser terminal
//! - `escape_key`: parsing of the configurable pass-through exit keystroke

pub mod ansi;
pub mod escape_key;
pub mod parser;

pub use escape_key::parse_escape_key;
pub use parser::{CsiSequence, EscapeParser, Event, ParserState};
