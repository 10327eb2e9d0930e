//! Port registry.
//!
//! Owns every known serial port and arbitrates exclusive use. All state sits
//! behind one mutex that is only held for the duration of a single operation;
//! callers get copies of [`Port`] back, never references into the table.
//!
//! Exclusive use is handed out as a [`PortLease`]. Dropping the lease releases
//! the port, so a session releases its port exactly once no matter how it
//! ends.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ResourceError;
use crate::serial::options::{validate_baud_rate, validate_character_size};
use crate::serial::{DiscoveredPort, FlowControl, Parity, PortOptions, StopBits};

/// Port identifier. Ids are never reused, including across rescans.
pub type PortId = u32;

/// Snapshot of a registered port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub id: PortId,
    pub device: String,
    pub options: PortOptions,
    pub in_use: bool,
    /// In use during a rescan that no longer found the device; removed on
    /// release.
    #[serde(skip)]
    pub stale: bool,
    #[serde(skip)]
    lease: u64,
}

#[derive(Debug, Default)]
struct PortTable {
    ports: BTreeMap<PortId, Port>,
    next_id: PortId,
    next_lease: u64,
}

impl PortTable {
    fn port_mut(&mut self, id: PortId) -> Result<&mut Port, ResourceError> {
        self.ports.get_mut(&id).ok_or(ResourceError::DeviceNotFound)
    }

    fn contains_device(&self, device: &str) -> bool {
        self.ports.values().any(|p| p.device == device)
    }

    fn insert(&mut self, device: String, options: PortOptions) -> PortId {
        self.next_id += 1;
        let id = self.next_id;
        self.ports.insert(
            id,
            Port {
                id,
                device,
                options,
                in_use: false,
                stale: false,
                lease: 0,
            },
        );
        id
    }
}

/// Result of [`PortRegistry::rescan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanSummary {
    pub added: usize,
    pub removed: usize,
    /// In-use ports carried over because their lease is still held.
    pub retained: usize,
}

#[derive(Debug, Default)]
pub struct PortRegistry {
    inner: Mutex<PortTable>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PortTable> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a device. Fails with `DeviceExists` if the device path is
    /// already known.
    pub fn add(&self, device: impl Into<String>, options: PortOptions) -> Result<PortId, ResourceError> {
        let device = device.into();
        let mut table = self.lock();
        if table.contains_device(&device) {
            return Err(ResourceError::DeviceExists);
        }
        let id = table.insert(device.clone(), options);
        debug!(port_id = id, device = %device, "port registered");
        Ok(id)
    }

    pub fn get(&self, id: PortId) -> Result<Port, ResourceError> {
        self.lock()
            .ports
            .get(&id)
            .cloned()
            .ok_or(ResourceError::DeviceNotFound)
    }

    /// All ports ordered by id.
    pub fn list(&self) -> Vec<Port> {
        self.lock().ports.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ports.is_empty()
    }

    /// Mutate a port's options under the lock.
    pub fn update<F>(&self, id: PortId, f: F) -> Result<PortOptions, ResourceError>
    where
        F: FnOnce(&mut PortOptions),
    {
        let mut table = self.lock();
        let port = table.port_mut(id)?;
        f(&mut port.options);
        Ok(port.options)
    }

    pub fn set_speed(&self, id: PortId, baud_rate: u32) -> Result<(), ResourceError> {
        let baud_rate = validate_baud_rate(baud_rate)?;
        self.update(id, |o| o.baud_rate = baud_rate).map(drop)
    }

    pub fn set_parity(&self, id: PortId, parity: Parity) -> Result<(), ResourceError> {
        self.update(id, |o| o.parity = parity).map(drop)
    }

    pub fn set_stop_bits(&self, id: PortId, stop_bits: StopBits) -> Result<(), ResourceError> {
        self.update(id, |o| o.stop_bits = stop_bits).map(drop)
    }

    pub fn set_character_size(&self, id: PortId, bits: u8) -> Result<(), ResourceError> {
        let bits = validate_character_size(bits)?;
        self.update(id, |o| o.character_size = bits).map(drop)
    }

    pub fn set_flow_control(&self, id: PortId, flow: FlowControl) -> Result<(), ResourceError> {
        self.update(id, |o| o.flow_control = flow).map(drop)
    }

    /// Claim a port for exclusive use.
    ///
    /// The check of `in_use` and the claim happen under one lock acquisition.
    pub fn acquire(self: &Arc<Self>, id: PortId) -> Result<PortLease, ResourceError> {
        let mut table = self.lock();
        table.next_lease += 1;
        let lease = table.next_lease;
        let port = table.port_mut(id)?;
        if port.in_use {
            return Err(ResourceError::DeviceInUse);
        }
        port.in_use = true;
        port.lease = lease;
        let snapshot = port.clone();
        drop(table);

        debug!(port_id = id, device = %snapshot.device, "port acquired");
        Ok(PortLease {
            registry: Arc::clone(self),
            port: snapshot,
            lease,
        })
    }

    /// Clear `in_use` regardless of who holds the lease.
    ///
    /// Outstanding leases for the port become inert: dropping them later does
    /// not touch a newer claim.
    pub fn release(&self, id: PortId) -> Result<(), ResourceError> {
        let mut table = self.lock();
        let port = table.port_mut(id)?;
        port.in_use = false;
        port.lease = 0;
        if port.stale {
            table.ports.remove(&id);
        }
        Ok(())
    }

    fn release_lease(&self, id: PortId, lease: u64) {
        let mut table = self.lock();
        let Some(port) = table.ports.get_mut(&id) else {
            debug!(port_id = id, "released port no longer registered");
            return;
        };
        if port.lease != lease {
            debug!(port_id = id, "stale lease dropped");
            return;
        }
        port.in_use = false;
        port.lease = 0;
        if port.stale {
            table.ports.remove(&id);
            info!(port_id = id, "stale port removed on release");
        } else {
            debug!(port_id = id, "port released");
        }
    }

    /// Replace the table with a fresh discovery snapshot.
    ///
    /// Free ports are dropped and rediscovered devices get new ids. Ports
    /// still in use keep their id; if their device was not rediscovered they
    /// are marked stale and disappear when released.
    pub fn rescan(&self, discovered: Vec<DiscoveredPort>) -> RescanSummary {
        let mut table = self.lock();
        let previous = std::mem::take(&mut table.ports);
        let mut summary = RescanSummary::default();

        for (id, mut port) in previous {
            if port.in_use {
                port.stale = !discovered.iter().any(|d| d.device == port.device);
                summary.retained += 1;
                table.ports.insert(id, port);
            } else {
                summary.removed += 1;
            }
        }

        for found in discovered {
            if table.contains_device(&found.device) {
                continue;
            }
            table.insert(found.device, found.options);
            summary.added += 1;
        }

        if summary.retained > 0 {
            warn!(retained = summary.retained, "rescan kept ports that are still in use");
        }
        info!(
            added = summary.added,
            removed = summary.removed,
            retained = summary.retained,
            "port table rescanned"
        );
        summary
    }
}

/// Exclusive claim on a port; releases it when dropped.
#[derive(Debug)]
pub struct PortLease {
    registry: Arc<PortRegistry>,
    port: Port,
    lease: u64,
}

impl PortLease {
    pub fn id(&self) -> PortId {
        self.port.id
    }

    pub fn device(&self) -> &str {
        &self.port.device
    }

    /// Options as they were when the lease was taken.
    pub fn options(&self) -> &PortOptions {
        &self.port.options
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.registry.release_lease(self.port.id, self.lease);
    }
}
