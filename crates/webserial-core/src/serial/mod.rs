//! Serial devices.
//!
//! The multiplexer talks to hardware through [`SerialBackend`], which can
//! enumerate devices and open one as an async byte stream. The production
//! backend is [`TtyBackend`] (termios on unix); tests substitute an in-memory
//! backend.

pub mod options;
#[cfg(unix)]
pub mod tty;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

pub use options::{FlowControl, Parity, PortOptions, StopBits};
#[cfg(unix)]
pub use tty::TtyBackend;

/// An open serial device.
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialIo for T {}

/// Boxed serial stream handed to a session.
pub type SerialStream = Box<dyn SerialIo>;

/// A device found by [`SerialBackend::scan`] with its current settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPort {
    pub device: String,
    pub options: PortOptions,
}

/// Access to the host's serial hardware.
pub trait SerialBackend: Send + Sync {
    /// Enumerate devices, sorted by device path.
    fn scan(&self) -> Vec<DiscoveredPort>;

    /// Open and configure `device`.
    fn open(&self, device: &str, options: &PortOptions) -> Result<SerialStream>;
}
