//! Process-wide state shared by every connection.

use std::sync::Arc;

use tracing::{info, warn};

use webserial_core::registry::{RescanSummary, SessionMode};
use webserial_core::serial::{DiscoveredPort, PortOptions, SerialBackend};
use webserial_core::{PortRegistry, SessionRegistry};

/// Registries, the serial backend and session settings.
///
/// Built once in `main` and passed down to the router and every session.
pub struct AppContext {
    pub ports: Arc<PortRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub backend: Arc<dyn SerialBackend>,
    /// Byte that leaves Serial mode.
    pub escape_key: u8,
    /// Devices registered from the command line; re-added on every rescan.
    pub static_devices: Vec<String>,
}

/// Outcome of [`AppContext::rescan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub ports: RescanSummary,
    pub evicted: usize,
}

impl AppContext {
    pub fn new(backend: Arc<dyn SerialBackend>, escape_key: u8) -> Self {
        Self {
            ports: Arc::new(PortRegistry::new()),
            sessions: Arc::new(SessionRegistry::new()),
            backend,
            escape_key,
            static_devices: Vec::new(),
        }
    }

    pub fn with_static_devices(mut self, devices: Vec<String>) -> Self {
        self.static_devices = devices;
        self
    }


    /// Populate the port table at startup.
    pub fn load_ports(&self, scan: bool) -> usize {
        let mut added = 0;
        for port in discover(self.backend.as_ref(), &self.static_devices, scan) {
            match self.ports.add(port.device.clone(), port.options) {
                Ok(_) => added += 1,
                Err(e) => warn!(device = %port.device, error = %e, "skipping port"),
            }
        }
        info!(count = added, "ports registered");
        added
    }

    /// Rediscover devices and evict every session in Serial mode.
    ///
    /// Discovery touches the filesystem and termios, so it runs on the
    /// blocking pool. If it fails the table is left alone.
    pub async fn rescan(&self) -> RefreshReport {
        let backend = Arc::clone(&self.backend);
        let static_devices = self.static_devices.clone();
        let discovered = match tokio::task::spawn_blocking(move || {
            discover(backend.as_ref(), &static_devices, true)
        })
        .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "device discovery failed; port table unchanged");
                return RefreshReport::default();
            }
        };
        let evicted = self
            .sessions
            .cancel_where(|s| s.mode == SessionMode::Serial)
            .len();
        let ports = self.ports.rescan(discovered);
        RefreshReport { ports, evicted }
    }
}

/// Devices found by the backend plus the static ones, without duplicates.
fn discover(backend: &dyn SerialBackend, static_devices: &[String], scan: bool) -> Vec<DiscoveredPort> {
    let mut found = if scan { backend.scan() } else { Vec::new() };
    for device in static_devices {
        if !found.iter().any(|d| &d.device == device) {
            found.push(DiscoveredPort {
                device: device.clone(),
                options: PortOptions::default(),
            });
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use webserial_test_utils::FakeSerialBackend;

    fn ctx(backend: Arc<FakeSerialBackend>) -> AppContext {
        AppContext::new(backend, 0x11)
    }

    #[test]
    fn load_merges_static_devices() {
        let backend = Arc::new(FakeSerialBackend::with_devices(&["/dev/ttyUSB0"]));
        let ctx = ctx(backend).with_static_devices(vec!["/dev/ttyS0".into(), "/dev/ttyUSB0".into()]);
        assert_eq!(ctx.load_ports(true), 2);
        let devices: Vec<String> = ctx.ports.list().into_iter().map(|p| p.device).collect();
        assert_eq!(devices, vec!["/dev/ttyUSB0", "/dev/ttyS0"]);
    }

    #[test]
    fn no_scan_only_static() {
        let backend = Arc::new(FakeSerialBackend::with_devices(&["/dev/ttyUSB0"]));
        let ctx = ctx(backend).with_static_devices(vec!["/dev/ttyS0".into()]);
        assert_eq!(ctx.load_ports(false), 1);
    }

    #[tokio::test]
    async fn rescan_evicts_serial_sessions() {
        let backend = Arc::new(FakeSerialBackend::with_devices(&["/dev/ttyUSB0"]));
        let ctx = ctx(backend.clone());
        ctx.load_ports(true);

        let serial = ctx.sessions.register("alice", "10.0.0.1:1");
        ctx.sessions.set_state(serial.id, SessionMode::Serial).unwrap();
        let control = ctx.sessions.register("bob", "10.0.0.2:1");
        ctx.sessions.set_state(control.id, SessionMode::Control).unwrap();

        backend.plug("/dev/ttyUSB1", PortOptions::default());
        let report = ctx.rescan().await;
        assert_eq!(report.evicted, 1);
        assert_eq!(report.ports.added, 2);
        assert_eq!(report.ports.removed, 1);
        assert!(serial.cancel.is_cancelled());
        assert!(!control.cancel.is_cancelled());
    }
}
