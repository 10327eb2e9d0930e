//! Shared registries.
//!
//! The port and session registries are the only state shared between
//! connection tasks. Each sits behind its own mutex, and no operation takes
//! both locks or holds one across an await point.

pub mod ports;
pub mod sessions;

pub use ports::{Port, PortId, PortLease, PortRegistry, RescanSummary};
pub use sessions::{CancelSignal, Registration, SessionId, SessionInfo, SessionMode, SessionRegistry};
