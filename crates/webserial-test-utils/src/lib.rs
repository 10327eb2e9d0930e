//! webserial-test-utils: Test infrastructure for webserial.
//!
//! Provides:
//! - FakeSerialBackend: in-memory serial devices backed by duplex pipes
//! - FakeTerminal: scripted browser terminal driving a session's channels

mod fake_serial;
mod fake_terminal;

pub use fake_serial::{FakeDevice, FakeSerialBackend};
pub use fake_terminal::{FakeTerminal, TerminalChannels};
