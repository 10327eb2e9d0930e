//! termios-backed serial devices.
//!
//! Devices are opened non-blocking and driven through tokio's `AsyncFd`, so
//! reads and writes wait on readiness instead of occupying a blocking thread.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use nix::sys::termios::{
    BaudRate, ControlFlags, InputFlags, SetArg, Termios, cfgetospeed, cfmakeraw, cfsetspeed,
    tcgetattr, tcsetattr,
};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};

use super::{DiscoveredPort, FlowControl, Parity, PortOptions, SerialBackend, SerialStream, StopBits};
use crate::constants::SERIAL_BY_PATH_DIR;
use crate::error::{Error, Result};

/// Host serial devices via termios.
#[derive(Debug, Clone)]
pub struct TtyBackend {
    scan_dir: String,
}

impl TtyBackend {
    pub fn new() -> Self {
        Self {
            scan_dir: SERIAL_BY_PATH_DIR.to_string(),
        }
    }

    /// Scan a different directory of device symlinks.
    pub fn with_scan_dir(dir: impl Into<String>) -> Self {
        Self {
            scan_dir: dir.into(),
        }
    }
}

impl Default for TtyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialBackend for TtyBackend {
    fn scan(&self) -> Vec<DiscoveredPort> {
        let entries = match std::fs::read_dir(&self.scan_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.scan_dir, error = %e, "serial scan directory unavailable");
                return Vec::new();
            }
        };

        let mut found: Vec<DiscoveredPort> = Vec::new();
        for entry in entries.flatten() {
            let link = entry.path();
            if !link.is_symlink() {
                continue;
            }
            let device = match std::fs::canonicalize(&link) {
                Ok(device) => device,
                Err(e) => {
                    debug!(link = %link.display(), error = %e, "dangling serial link");
                    continue;
                }
            };
            match read_settings(&device) {
                Ok(options) => found.push(DiscoveredPort {
                    device: device.to_string_lossy().into_owned(),
                    options,
                }),
                Err(e) => debug!(device = %device.display(), error = %e, "skipping device"),
            }
        }

        found.sort_by(|a, b| a.device.cmp(&b.device));
        found.dedup_by(|a, b| a.device == b.device);
        info!(count = found.len(), "serial scan complete");
        found
    }

    fn open(&self, device: &str, options: &PortOptions) -> Result<SerialStream> {
        let file = open_nonblocking(Path::new(device)).map_err(|e| Error::Serial {
            message: format!("failed to open {}: {}", device, e),
        })?;

        let mut term = tcgetattr(&file).map_err(|e| Error::Serial {
            message: format!("failed to read settings of {}: {}", device, e),
        })?;
        apply_options(&mut term, options)?;
        tcsetattr(&file, SetArg::TCSANOW, &term).map_err(|e| Error::Serial {
            message: format!("failed to configure {}: {}", device, e),
        })?;

        let fd = AsyncFd::new(file).map_err(|e| Error::Serial {
            message: format!("failed to register {} with the reactor: {}", device, e),
        })?;

        info!(device, options = %options, "serial device opened");
        Ok(Box::new(TtyStream { fd }))
    }
}

fn open_nonblocking(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
}

/// Read the current line settings of a device. Flow control is always
/// reported as `none`.
fn read_settings(device: &Path) -> Result<PortOptions> {
    let file = open_nonblocking(device)?;
    let term = tcgetattr(&file).map_err(|e| Error::Serial {
        message: format!("tcgetattr failed: {}", e),
    })?;
    let flags = term.control_flags;

    let parity = if !flags.contains(ControlFlags::PARENB) {
        Parity::None
    } else if flags.contains(ControlFlags::PARODD) {
        Parity::Odd
    } else {
        Parity::Even
    };
    let stop_bits = if flags.contains(ControlFlags::CSTOPB) {
        StopBits::Two
    } else {
        StopBits::One
    };
    let size = flags & ControlFlags::CSIZE;
    let character_size = if size == ControlFlags::CS5 {
        5
    } else if size == ControlFlags::CS6 {
        6
    } else if size == ControlFlags::CS7 {
        7
    } else {
        8
    };

    let baud_rate = baud_from_termios(cfgetospeed(&term)).unwrap_or_else(|| {
        warn!(device = %device.display(), "unrecognized output speed, assuming default");
        PortOptions::default().baud_rate
    });

    Ok(PortOptions {
        baud_rate,
        parity,
        stop_bits,
        character_size,
        flow_control: FlowControl::None,
    })
}

fn apply_options(term: &mut Termios, options: &PortOptions) -> Result<()> {
    cfmakeraw(term);

    let speed = baud_to_termios(options.baud_rate).ok_or_else(|| Error::Serial {
        message: format!("baud rate {} not supported on this platform", options.baud_rate),
    })?;
    cfsetspeed(term, speed).map_err(|e| Error::Serial {
        message: format!("failed to set speed: {}", e),
    })?;

    let flags = &mut term.control_flags;
    flags.insert(ControlFlags::CLOCAL | ControlFlags::CREAD);

    flags.remove(ControlFlags::CSIZE);
    flags.insert(match options.character_size {
        5 => ControlFlags::CS5,
        6 => ControlFlags::CS6,
        7 => ControlFlags::CS7,
        _ => ControlFlags::CS8,
    });

    flags.remove(ControlFlags::PARENB | ControlFlags::PARODD);
    match options.parity {
        Parity::None => {}
        Parity::Odd => flags.insert(ControlFlags::PARENB | ControlFlags::PARODD),
        Parity::Even => flags.insert(ControlFlags::PARENB),
    }

    match options.stop_bits {
        StopBits::One => flags.remove(ControlFlags::CSTOPB),
        StopBits::Two => flags.insert(ControlFlags::CSTOPB),
        StopBits::OnePointFive => {
            return Err(Error::Serial {
                message: "1.5 stop bits are not supported by termios".to_string(),
            });
        }
    }

    flags.remove(ControlFlags::CRTSCTS);
    term.input_flags
        .remove(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
    match options.flow_control {
        FlowControl::None => {}
        FlowControl::Hardware => term.control_flags.insert(ControlFlags::CRTSCTS),
        FlowControl::Software => term.input_flags.insert(InputFlags::IXON | InputFlags::IXOFF),
    }

    Ok(())
}

macro_rules! baud_table {
    ($($rate:literal => $variant:ident),* $(,)?) => {
        fn baud_to_termios(rate: u32) -> Option<BaudRate> {
            match rate {
                $($rate => Some(BaudRate::$variant),)*
                _ => baud_to_termios_extended(rate),
            }
        }

        fn baud_from_termios(speed: BaudRate) -> Option<u32> {
            match speed {
                $(BaudRate::$variant => Some($rate),)*
                other => baud_from_termios_extended(other),
            }
        }
    };
}

baud_table! {
    50 => B50, 75 => B75, 110 => B110, 134 => B134, 150 => B150, 200 => B200,
    300 => B300, 600 => B600, 1200 => B1200, 1800 => B1800, 2400 => B2400,
    4800 => B4800, 9600 => B9600, 19200 => B19200, 38400 => B38400,
    57600 => B57600, 115200 => B115200, 230400 => B230400,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const EXTENDED_BAUD: &[(u32, BaudRate)] = &[
    (460_800, BaudRate::B460800),
    (500_000, BaudRate::B500000),
    (576_000, BaudRate::B576000),
    (921_600, BaudRate::B921600),
    (1_000_000, BaudRate::B1000000),
    (1_152_000, BaudRate::B1152000),
    (1_500_000, BaudRate::B1500000),
    (2_000_000, BaudRate::B2000000),
    (2_500_000, BaudRate::B2500000),
    (3_000_000, BaudRate::B3000000),
    (3_500_000, BaudRate::B3500000),
    (4_000_000, BaudRate::B4000000),
];

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const EXTENDED_BAUD: &[(u32, BaudRate)] = &[];

fn baud_to_termios_extended(rate: u32) -> Option<BaudRate> {
    EXTENDED_BAUD
        .iter()
        .find(|(r, _)| *r == rate)
        .map(|(_, b)| *b)
}

fn baud_from_termios_extended(speed: BaudRate) -> Option<u32> {
    EXTENDED_BAUD
        .iter()
        .find(|(_, b)| *b == speed)
        .map(|(r, _)| *r)
}

/// Non-blocking tty registered with the tokio reactor.
pub struct TtyStream {
    fd: AsyncFd<File>,
}

impl AsyncRead for TtyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                // EIO is how a tty reports that the device went away.
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EIO) => {
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for TtyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(data)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
