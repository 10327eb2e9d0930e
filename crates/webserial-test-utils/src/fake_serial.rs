//! Fake serial backend for testing without hardware.
//!
//! Every successful `open` creates an in-memory duplex pipe. The session gets
//! one end; the other end is handed to the test as a [`FakeDevice`] through
//! the receiver returned by [`FakeSerialBackend::take_opened_receiver`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use webserial_core::error::{Error, Result};
use webserial_core::serial::{DiscoveredPort, PortOptions, SerialBackend, SerialStream};

const PIPE_CAPACITY: usize = 4096;

/// Device end of an opened fake port.
#[derive(Debug)]
pub struct FakeDevice {
    pub device: String,
    pub options: PortOptions,
    stream: DuplexStream,
}

impl FakeDevice {
    /// Send bytes as if the hardware produced them.
    pub async fn write(&mut self, data: &[u8]) {
        let _ = self.stream.write_all(data).await;
    }

    /// Read whatever the session wrote, waiting up to `timeout` for at least
    /// `min` bytes. Returns what was collected.
    pub async fn read_at_least(&mut self, min: usize, timeout: Duration) -> Vec<u8> {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = [0u8; 1024];
        while out.len() < min {
            match tokio::time::timeout_at(deadline, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            }
        }
        out
    }

    /// True once the session closed its end.
    pub async fn is_closed(&mut self, timeout: Duration) -> bool {
        let mut buf = [0u8; 64];
        loop {
            match tokio::time::timeout(timeout, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

/// In-memory serial backend.
#[derive(Debug)]
pub struct FakeSerialBackend {
    devices: Mutex<Vec<DiscoveredPort>>,
    failures: Mutex<HashMap<String, String>>,
    opened_tx: mpsc::UnboundedSender<FakeDevice>,
    opened_rx: Mutex<Option<mpsc::UnboundedReceiver<FakeDevice>>>,
}

impl FakeSerialBackend {
    pub fn new() -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        Self {
            devices: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            opened_tx,
            opened_rx: Mutex::new(Some(opened_rx)),
        }
    }

    /// Backend whose scan reports `devices` with default options.
    pub fn with_devices(devices: &[&str]) -> Self {
        let backend = Self::new();
        for device in devices {
            backend.plug(device, PortOptions::default());
        }
        backend
    }

    /// Make a device visible to the next scan.
    pub fn plug(&self, device: &str, options: PortOptions) {
        let mut devices = self.devices.lock().unwrap();
        devices.retain(|d| d.device != device);
        devices.push(DiscoveredPort {
            device: device.to_string(),
            options,
        });
        devices.sort_by(|a, b| a.device.cmp(&b.device));
    }

    /// Remove a device from future scans.
    pub fn unplug(&self, device: &str) {
        self.devices.lock().unwrap().retain(|d| d.device != device);
    }

    /// Make `open` of `device` fail with `message`.
    pub fn fail_open(&self, device: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(device.to_string(), message.to_string());
    }

    /// Take the receiver of device ends (for tests to drive the hardware side).
    pub fn take_opened_receiver(&self) -> Option<mpsc::UnboundedReceiver<FakeDevice>> {
        self.opened_rx.lock().unwrap().take()
    }
}

impl Default for FakeSerialBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialBackend for FakeSerialBackend {
    fn scan(&self) -> Vec<DiscoveredPort> {
        self.devices.lock().unwrap().clone()
    }

    fn open(&self, device: &str, options: &PortOptions) -> Result<SerialStream> {
        if let Some(message) = self.failures.lock().unwrap().get(device) {
            return Err(Error::Serial {
                message: message.clone(),
            });
        }
        let (session_end, device_end) = tokio::io::duplex(PIPE_CAPACITY);
        let _ = self.opened_tx.send(FakeDevice {
            device: device.to_string(),
            options: *options,
            stream: device_end,
        });
        Ok(Box::new(session_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_is_sorted() {
        let backend = FakeSerialBackend::with_devices(&["/dev/ttyB", "/dev/ttyA"]);
        let devices: Vec<String> = backend.scan().into_iter().map(|d| d.device).collect();
        assert_eq!(devices, vec!["/dev/ttyA", "/dev/ttyB"]);
        backend.unplug("/dev/ttyA");
        assert_eq!(backend.scan().len(), 1);
    }

    #[tokio::test]
    async fn open_connects_both_ends() {
        let backend = FakeSerialBackend::new();
        let mut opened = backend.take_opened_receiver().unwrap();
        let mut stream = backend.open("/dev/ttyA", &PortOptions::default()).unwrap();
        let mut device = opened.recv().await.unwrap();

        stream.write_all(b"ping").await.unwrap();
        let got = device.read_at_least(4, Duration::from_secs(1)).await;
        assert_eq!(got, b"ping");

        device.write(b"pong").await;
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn failing_open() {
        let backend = FakeSerialBackend::new();
        backend.fail_open("/dev/ttyA", "permission denied");
        let err = match backend.open("/dev/ttyA", &PortOptions::default()) {
            Ok(_) => panic!("open should fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("permission denied"));
    }
}
