//! Session registry.
//!
//! Tracks metadata for every live terminal connection and keeps a
//! cancellation handle per session so operators can kill a session from a
//! different task. Cancelling only signals; the session's own task performs
//! the teardown (releasing its port lease and unregistering), which keeps
//! kill and natural shutdown from racing over the same resources.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::constants::{CONTROL_MODE_NAME, SERIAL_MODE_NAME};
use crate::error::ResourceError;

pub type SessionId = u64;

/// Mode a session is in, as shown by `session list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Registered but no mode entered yet.
    #[default]
    Pending,
    Control,
    Serial,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Pending => "",
            SessionMode::Control => CONTROL_MODE_NAME,
            SessionMode::Serial => SERIAL_MODE_NAME,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub username: String,
    pub remote_address: String,
    /// Attached device path, empty when none.
    pub device: String,
    pub mode: SessionMode,
}

struct SessionEntry {
    info: SessionInfo,
    cancel: watch::Sender<bool>,
}

#[derive(Default)]
struct SessionTable {
    sessions: BTreeMap<SessionId, SessionEntry>,
    next_id: SessionId,
}

/// Receiving side of a session's cancellation handle.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the session has been cancelled. Never resolves if the
    /// registry entry goes away without a cancel.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Returned by [`SessionRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    pub id: SessionId,
    pub cancel: CancelSignal,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<SessionTable>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionTable> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a newly authenticated connection.
    pub fn register(&self, username: impl Into<String>, remote_address: impl Into<String>) -> Registration {
        let (cancel, rx) = watch::channel(false);
        let mut table = self.lock();
        table.next_id += 1;
        let id = table.next_id;
        let info = SessionInfo {
            id,
            username: username.into(),
            remote_address: remote_address.into(),
            device: String::new(),
            mode: SessionMode::Pending,
        };
        info!(session_id = id, user = %info.username, address = %info.remote_address, "session registered");
        table.sessions.insert(id, SessionEntry { info, cancel });
        Registration {
            id,
            cancel: CancelSignal { rx },
        }
    }

    pub fn set_state(&self, id: SessionId, mode: SessionMode) -> Result<(), ResourceError> {
        let mut table = self.lock();
        let entry = table
            .sessions
            .get_mut(&id)
            .ok_or(ResourceError::SessionNotFound)?;
        entry.info.mode = mode;
        debug!(session_id = id, mode = %mode, "session mode changed");
        Ok(())
    }

    pub fn set_device(&self, id: SessionId, device: impl Into<String>) -> Result<(), ResourceError> {
        let mut table = self.lock();
        let entry = table
            .sessions
            .get_mut(&id)
            .ok_or(ResourceError::SessionNotFound)?;
        entry.info.device = device.into();
        Ok(())
    }

    pub fn unregister(&self, id: SessionId) -> Result<(), ResourceError> {
        let removed = self.lock().sessions.remove(&id);
        match removed {
            Some(entry) => {
                info!(session_id = id, user = %entry.info.username, "session unregistered");
                Ok(())
            }
            None => Err(ResourceError::SessionNotFound),
        }
    }

    /// Signal a session to terminate.
    ///
    /// Safe to call while the session is tearing itself down: if the entry is
    /// already gone this reports `SessionNotFound` and does nothing else.
    pub fn cancel(&self, id: SessionId) -> Result<(), ResourceError> {
        let table = self.lock();
        let entry = table
            .sessions
            .get(&id)
            .ok_or(ResourceError::SessionNotFound)?;
        entry.cancel.send_replace(true);
        info!(session_id = id, "session cancelled");
        Ok(())
    }

    /// Cancel every session matching `pred`, returning their ids.
    pub fn cancel_where<F>(&self, pred: F) -> Vec<SessionId>
    where
        F: Fn(&SessionInfo) -> bool,
    {
        let table = self.lock();
        let mut cancelled = Vec::new();
        for (id, entry) in &table.sessions {
            if pred(&entry.info) {
                entry.cancel.send_replace(true);
                cancelled.push(*id);
            }
        }
        if !cancelled.is_empty() {
            info!(count = cancelled.len(), "sessions cancelled");
        }
        cancelled
    }

    pub fn get(&self, id: SessionId) -> Result<SessionInfo, ResourceError> {
        self.lock()
            .sessions
            .get(&id)
            .map(|e| e.info.clone())
            .ok_or(ResourceError::SessionNotFound)
    }

    /// All sessions ordered by id.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.lock().sessions.values().map(|e| e.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }
}
