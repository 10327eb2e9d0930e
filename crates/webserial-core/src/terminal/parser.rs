//! Escape-sequence parser for the inbound terminal stream.
//!
//! Turns the raw bytes typed into the browser terminal into [`Event`]s. The
//! parser is a pure transducer: it does not know what a cursor-up means, it
//! only reports that a CSI sequence with final byte `A` arrived.
//!
//! Recognized framing:
//! - `ESC [ <params> <final>` (final byte in 0x40..=0x7E)
//! - `ESC P <content> ESC \` (device control string)
//! - `ESC _ <content> ESC \` (application program command)
//!
//! Any other byte after ESC is dropped and the parser returns to text.

use std::borrow::Cow;

use tracing::{debug, warn};

use super::ansi::{ESC, ST_FINAL};
use crate::constants::MAX_SEQUENCE_LEN;

/// Parser state. There is no terminal state; a parser lives as long as its
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Text,
    Esc,
    Csi,
    Dcs,
    Apc,
}

/// A complete control sequence introduced by `ESC [`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsiSequence {
    /// Parameter and intermediate bytes between `ESC [` and the final byte.
    pub params: Vec<u8>,
    /// Final byte selecting the operation.
    pub final_byte: u8,
}

impl CsiSequence {
    pub fn new(params: impl Into<Vec<u8>>, final_byte: u8) -> Self {
        Self {
            params: params.into(),
            final_byte,
        }
    }

    /// Parameters as text, for logging and matching.
    pub fn params_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.params)
    }

    /// Re-encode as `ESC [ <params> <final>`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.params.len() + 3);
        out.push(ESC);
        out.push(b'[');
        out.extend_from_slice(&self.params);
        out.push(self.final_byte);
        out
    }
}

/// Structured event produced from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A single byte outside any escape sequence (printable or C0 control).
    Char(u8),
    Csi(CsiSequence),
    /// Device control string content, terminator stripped.
    Dcs(Vec<u8>),
    /// Application program command content, terminator stripped.
    Apc(Vec<u8>),
}

impl Event {
    /// True for C0 controls and DEL.
    pub fn is_control(&self) -> bool {
        matches!(self, Event::Char(b) if *b < 0x20 || *b == 0x7f)
    }
}

/// Byte-at-a-time escape parser.
#[derive(Debug, Default)]
pub struct EscapeParser {
    state: ParserState,
    buf: Vec<u8>,
    /// Set when the current sequence outgrew [`MAX_SEQUENCE_LEN`]; the
    /// sequence is dropped when its terminator arrives.
    overflowed: bool,
}

impl EscapeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Bytes accumulated for the sequence in progress.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Feed a chunk and collect every event it completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Event> {
        data.iter().filter_map(|&b| self.advance(b)).collect()
    }

    /// Process a single byte.
    pub fn advance(&mut self, byte: u8) -> Option<Event> {
        match self.state {
            ParserState::Text => {
                if byte == ESC {
                    self.transition(ParserState::Esc);
                    None
                } else {
                    Some(Event::Char(byte))
                }
            }
            ParserState::Esc => {
                match byte {
                    b'[' => self.transition(ParserState::Csi),
                    b'P' => self.transition(ParserState::Dcs),
                    b'_' => self.transition(ParserState::Apc),
                    other => {
                        debug!(byte = other, "unsupported escape follower dropped");
                        self.transition(ParserState::Text);
                    }
                }
                None
            }
            ParserState::Csi => {
                if (0x40..=0x7e).contains(&byte) {
                    let params = std::mem::take(&mut self.buf);
                    let overflowed = self.overflowed;
                    self.transition(ParserState::Text);
                    if overflowed {
                        warn!(final_byte = byte, "oversized CSI sequence discarded");
                        return None;
                    }
                    Some(Event::Csi(CsiSequence::new(params, byte)))
                } else {
                    self.accumulate(byte);
                    None
                }
            }
            ParserState::Dcs | ParserState::Apc => {
                self.accumulate(byte);
                if !self.buf.ends_with(&[ESC, ST_FINAL]) {
                    return None;
                }
                let kind = self.state;
                let mut content = std::mem::take(&mut self.buf);
                content.truncate(content.len() - 2);
                let overflowed = self.overflowed;
                self.transition(ParserState::Text);
                if overflowed {
                    warn!(state = ?kind, "oversized string sequence discarded");
                    return None;
                }
                Some(if kind == ParserState::Dcs {
                    Event::Dcs(content)
                } else {
                    Event::Apc(content)
                })
            }
        }
    }

    fn transition(&mut self, next: ParserState) {
        self.buf.clear();
        self.overflowed = false;
        self.state = next;
    }

    fn accumulate(&mut self, byte: u8) {
        if self.buf.len() >= MAX_SEQUENCE_LEN {
            // Keep the last byte so a terminator split across the cut is
            // still recognized.
            let last = self.buf.last().copied();
            self.buf.clear();
            self.buf.extend(last);
            self.overflowed = true;
        }
        self.buf.push(byte);
    }
}
