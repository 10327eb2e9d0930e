//! Serial pass-through mode.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use webserial_core::PortLease;
use webserial_core::constants::{SERIAL_MODE_NAME, SERIAL_QUEUE_DEPTH, SERIAL_READ_BUFFER};
use webserial_core::error::{Error, Result};
use webserial_core::registry::PortId;
use webserial_core::serial::SerialStream;
use webserial_core::terminal::Event;
use webserial_core::terminal::ansi::{self, CLEAR_SCREEN, CRLF, CURSOR_HOME};
use webserial_core::terminal::escape_key::describe_escape_key;

use super::outbound::{Outbound, spawn_writer};

/// What the session should do after an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Stay,
    /// The escape key was pressed.
    Leave,
}

/// Produced by the device reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Data(Bytes),
    /// EOF (`None`) or a read error.
    Closed(Option<String>),
}

/// An open device bound to a session.
///
/// Holds the port lease: dropping the link releases the port. The reader
/// task is aborted on drop; the writer task drains what was already queued
/// and then closes its half of the device.
pub struct SerialLink {
    lease: PortLease,
    escape_key: u8,
    writer_tx: mpsc::Sender<Bytes>,
    device_rx: mpsc::Receiver<DeviceEvent>,
    reader: JoinHandle<()>,
    /// Keystrokes collected for the device since the last flush.
    pending: Vec<u8>,
}

impl SerialLink {
    pub fn start(lease: PortLease, stream: SerialStream, escape_key: u8) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer_tx, writer_rx) = mpsc::channel(SERIAL_QUEUE_DEPTH);
        // Writer errors surface as a closed queue on the next flush.
        drop(spawn_writer(write_half, writer_rx, "serial"));
        let (device_tx, device_rx) = mpsc::channel(SERIAL_QUEUE_DEPTH);
        let reader = tokio::spawn(read_device(read_half, device_tx, lease.id()));

        Self {
            lease,
            escape_key,
            writer_tx,
            device_rx,
            reader,
            pending: Vec::new(),
        }
    }

    pub fn port_id(&self) -> PortId {
        self.lease.id()
    }

    pub fn device(&self) -> &str {
        self.lease.device()
    }

    /// Serial-mode screen: mode announcement, cleared screen, title and the
    /// exit hint.
    pub fn enter(&self) -> String {
        let mut out = ansi::dcs('S', SERIAL_MODE_NAME);
        out.push_str(CLEAR_SCREEN);
        out.push_str(CURSOR_HOME);
        out.push_str(&ansi::set_title(&format!(
            "Serial Port on {} @ {}",
            self.lease.device(),
            self.lease.options().baud_rate
        )));
        out.push_str("Connected.");
        out.push_str(CRLF);
        out.push_str(&format!("Type {} to exit", describe_escape_key(self.escape_key)));
        out.push_str(CRLF);
        out
    }

    /// Route one input event. Keystrokes are buffered until [`flush`](Self::flush).
    pub fn on_event(&mut self, event: &Event) -> LinkAction {
        match event {
            Event::Char(byte) if *byte == self.escape_key => LinkAction::Leave,
            Event::Char(byte) => {
                self.pending.push(*byte);
                LinkAction::Stay
            }
            Event::Csi(csi) => {
                self.pending.extend_from_slice(&csi.encode());
                LinkAction::Stay
            }
            Event::Dcs(_) | Event::Apc(_) => {
                trace!(port_id = self.port_id(), "ignoring DCS/APC in serial mode");
                LinkAction::Stay
            }
        }
    }

    /// Queue buffered keystrokes for the device.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let data = Bytes::from(std::mem::take(&mut self.pending));
        self.writer_tx.send(data).await.map_err(|_| Error::Serial {
            message: "write to device failed".to_string(),
        })
    }

    /// Next event from the device reader.
    pub async fn next_device_event(&mut self) -> DeviceEvent {
        self.device_rx
            .recv()
            .await
            .unwrap_or_else(|| DeviceEvent::Closed(Some("reader stopped".to_string())))
    }

    /// Relay device output to the terminal unchanged.
    pub async fn on_device_data(&self, data: Bytes, outbound: &Outbound) -> Result<()> {
        trace!(port_id = self.port_id(), len = data.len(), "device -> terminal");
        outbound.send(data).await
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.reader.abort();
        debug!(port_id = self.lease.id(), device = %self.lease.device(), "serial link closed");
    }
}

async fn read_device<R>(mut reader: R, tx: mpsc::Sender<DeviceEvent>, port_id: PortId)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; SERIAL_READ_BUFFER];
    let closed = loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!(port_id, "device EOF");
                break DeviceEvent::Closed(None);
            }
            Ok(n) => {
                if tx
                    .send(DeviceEvent::Data(Bytes::copy_from_slice(&buf[..n])))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                warn!(port_id, error = %e, "device read failed");
                break DeviceEvent::Closed(Some(e.to_string()));
            }
        }
    };
    let _ = tx.send(closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use webserial_core::PortRegistry;
    use webserial_core::serial::{PortOptions, SerialBackend};
    use webserial_core::terminal::CsiSequence;
    use webserial_test_utils::FakeSerialBackend;

    async fn link() -> (SerialLink, webserial_test_utils::FakeDevice, Arc<PortRegistry>) {
        let ports = Arc::new(PortRegistry::new());
        let id = ports.add("/dev/ttyUSB0", PortOptions::default()).unwrap();
        let backend = FakeSerialBackend::new();
        let mut opened = backend.take_opened_receiver().unwrap();
        let lease = ports.acquire(id).unwrap();
        let stream = backend.open(lease.device(), lease.options()).unwrap();
        let link = SerialLink::start(lease, stream, 0x11);
        let device = opened.recv().await.unwrap();
        (link, device, ports)
    }

    #[tokio::test]
    async fn banner_names_device_and_key() {
        let (link, _device, _) = link().await;
        let banner = link.enter();
        assert!(banner.starts_with("\x1bPSserial\x1b\\\x1b[2J\x1b[0;0H"));
        assert!(banner.contains("Serial Port on /dev/ttyUSB0 @ 115200"));
        assert!(banner.ends_with("Connected.\r\nType Ctrl + q to exit\r\n"));
    }

    #[tokio::test]
    async fn keystrokes_and_csi_forwarded() {
        let (mut link, mut device, _) = link().await;
        assert_eq!(link.on_event(&Event::Char(b'h')), LinkAction::Stay);
        assert_eq!(link.on_event(&Event::Char(b'i')), LinkAction::Stay);
        link.on_event(&Event::Csi(CsiSequence::new(b"1;5".to_vec(), b'C')));
        link.on_event(&Event::Apc(b"open_port=2".to_vec()));
        link.flush().await.unwrap();
        let got = device.read_at_least(8, Duration::from_secs(1)).await;
        assert_eq!(got, b"hi\x1b[1;5C");
    }

    #[tokio::test]
    async fn escape_key_leaves() {
        let (mut link, _device, _) = link().await;
        assert_eq!(link.on_event(&Event::Char(0x11)), LinkAction::Leave);
    }

    #[tokio::test]
    async fn device_data_and_eof() {
        let (mut link, mut device, _) = link().await;
        device.write(b"boot> ").await;
        assert_eq!(
            link.next_device_event().await,
            DeviceEvent::Data(Bytes::from_static(b"boot> "))
        );
        drop(device);
        assert_eq!(link.next_device_event().await, DeviceEvent::Closed(None));
    }

    #[tokio::test]
    async fn drop_releases_port() {
        let (link, mut device, ports) = link().await;
        assert!(ports.get(1).unwrap().in_use);
        drop(link);
        assert!(!ports.get(1).unwrap().in_use);
        assert!(device.is_closed(Duration::from_secs(1)).await);
    }
}
