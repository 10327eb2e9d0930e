//! webserial-core: Shared library for the webserial multiplexer.
//!
//! This crate provides:
//! - Terminal escape-sequence parser and ANSI output helpers
//! - Serial port options and the serial backend seam (termios on unix)
//! - HTTP Digest header parsing, digest computation and the password store
//! - Port and session registries shared across connection tasks
//! - Per-session command history
//! - Logging and error types

pub mod auth;
pub mod constants;
pub mod error;
pub mod history;
pub mod logging;
pub mod registry;
pub mod serial;
pub mod terminal;

pub use error::{AuthError, Error, HeaderError, ResourceError, Result};
pub use history::History;
pub use logging::{LogFormat, init_logging};
pub use registry::{PortId, PortLease, PortRegistry, SessionId, SessionRegistry};
