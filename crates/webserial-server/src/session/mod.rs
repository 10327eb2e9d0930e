//! Terminal sessions.
//!
//! A session owns one escape parser for its whole lifetime and switches
//! between two modes:
//! - Command: [`CommandShell`] line editing and commands
//! - Serial: [`SerialLink`] pass-through to a leased port
//!
//! The parser is shared by both modes, so a frame that contains the escape
//! key followed by more input continues in Command mode from the next byte.
//!
//! Teardown happens in `Drop`: the link (and with it the port lease) is
//! dropped and the registry entry removed, whether the terminal closed, the
//! outbound channel failed, or an operator cancelled the session.

mod outbound;
mod serial;
mod shell;
mod table;

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webserial_core::ResourceError;
use webserial_core::error::Result;
use webserial_core::registry::{CancelSignal, PortId, SessionId, SessionMode};
use webserial_core::terminal::EscapeParser;

use crate::context::AppContext;

pub use outbound::{Outbound, spawn_writer};
pub use serial::{DeviceEvent, LinkAction, SerialLink};
pub use shell::{CommandShell, ShellAction};
pub use table::Table;

pub struct Session {
    id: SessionId,
    ctx: Arc<AppContext>,
    outbound: Outbound,
    parser: EscapeParser,
    shell: CommandShell,
    link: Option<SerialLink>,
}

impl Session {
    /// Register a new session. The returned signal fires when the session is
    /// cancelled through the registry.
    pub fn new(
        ctx: Arc<AppContext>,
        username: &str,
        remote_address: &str,
        outbound: Outbound,
    ) -> (Self, CancelSignal) {
        let registration = ctx.sessions.register(username, remote_address);
        let shell = CommandShell::new(ctx.clone(), registration.id);
        let session = Self {
            id: registration.id,
            ctx,
            outbound,
            parser: EscapeParser::new(),
            shell,
            link: None,
        };
        (session, registration.cancel)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        if self.link.is_some() {
            SessionMode::Serial
        } else {
            SessionMode::Control
        }
    }

    /// Drive the session until the terminal goes away, output can no longer
    /// be delivered, or the session is cancelled.
    ///
    /// Every await in the loop races the cancel signal, so a kill takes
    /// effect even while a write is stuck behind a slow terminal or device.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Bytes>, mut cancel: CancelSignal) -> Result<()> {
        match until_cancelled(&mut cancel, self.enter_command(None)).await {
            Some(result) => result?,
            None => {
                self.terminated();
                return Ok(());
            }
        }

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                frame = inbound.recv() => match frame {
                    Some(data) => until_cancelled(&mut cancel, self.on_input(&data)).await,
                    None => {
                        debug!(session_id = self.id, "terminal closed");
                        return Ok(());
                    }
                },
                event = next_device_event(&mut self.link) => {
                    until_cancelled(&mut cancel, self.on_device_event(event)).await
                }
            };
            match step {
                Some(Ok(())) => {}
                Some(Err(e)) if e.is_transient() => {
                    warn!(session_id = self.id, error = %e, "session step failed");
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.terminated();
                    return Ok(());
                }
            }
        }
    }

    /// Best-effort farewell; never waits on a full queue.
    fn terminated(&self) {
        info!(session_id = self.id, "session cancelled");
        if !self.outbound.try_send("\r\nSession terminated\r\n") {
            debug!(session_id = self.id, "farewell dropped");
        }
    }

    async fn on_input(&mut self, data: &[u8]) -> Result<()> {
        for event in self.parser.feed(data) {
            match self.link.as_mut() {
                Some(link) => {
                    if link.on_event(&event) == LinkAction::Leave {
                        self.leave_serial(None).await?;
                    }
                }
                None => match self.shell.on_event(event) {
                    Some(ShellAction::Connect(id)) => {
                        self.flush_shell().await?;
                        self.connect(id).await?;
                    }
                    Some(ShellAction::Refresh) => {
                        let report = self.ctx.rescan().await;
                        self.shell.report_refresh(&report);
                        self.shell.prompt();
                    }
                    None => {}
                },
            }
        }

        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.flush().await {
                let notice = format!("Lost connection to {}: {e}", link.device());
                self.leave_serial(Some(notice)).await?;
            }
        }
        self.flush_shell().await
    }

    async fn on_device_event(&mut self, event: DeviceEvent) -> Result<()> {
        let Some(link) = self.link.as_ref() else {
            return Ok(());
        };
        match event {
            DeviceEvent::Data(data) => link.on_device_data(data, &self.outbound).await,
            DeviceEvent::Closed(reason) => {
                let notice = match reason {
                    Some(e) => format!("Lost connection to {}: {e}", link.device()),
                    None => format!("Serial device {} closed", link.device()),
                };
                self.leave_serial(Some(notice)).await
            }
        }
    }

    async fn flush_shell(&mut self) -> Result<()> {
        let out = self.shell.take_output();
        self.outbound.send(out).await
    }

    fn record(&self, mode: SessionMode, device: &str) {
        if let Err(e) = self
            .ctx
            .sessions
            .set_state(self.id, mode)
            .and_then(|()| self.ctx.sessions.set_device(self.id, device))
        {
            warn!(session_id = self.id, error = %e, "session registry update failed");
        }
    }

    async fn enter_command(&mut self, notice: Option<&str>) -> Result<()> {
        self.record(SessionMode::Control, "");
        self.shell.enter(notice);
        self.flush_shell().await
    }

    async fn connect_failed(&mut self, message: String) -> Result<()> {
        warn!(session_id = self.id, error = %message, "connect failed");
        self.shell.error(message);
        self.shell.prompt();
        self.flush_shell().await
    }

    /// Lease the port, open the device and switch to Serial mode. Failures
    /// leave the session in Command mode with an inline error.
    async fn connect(&mut self, id: PortId) -> Result<()> {
        let lease = match self.ctx.ports.acquire(id) {
            Ok(lease) => lease,
            Err(ResourceError::DeviceInUse) => {
                return self.connect_failed(format!("Port with id {id} is in use")).await;
            }
            Err(e) => {
                return self
                    .connect_failed(format!("Unable to find port with id {id}: {e}"))
                    .await;
            }
        };

        // Serial from here on, so a concurrent rescan evicts this session.
        self.record(SessionMode::Serial, lease.device());
        let stream = match self.ctx.backend.open(lease.device(), lease.options()) {
            Ok(stream) => stream,
            Err(e) => {
                drop(lease);
                self.record(SessionMode::Control, "");
                return self.connect_failed(format!("Error creating port: {e}")).await;
            }
        };

        let link = SerialLink::start(lease, stream, self.ctx.escape_key);
        info!(session_id = self.id, port_id = id, device = %link.device(), "serial link established");
        self.outbound.send(link.enter()).await?;
        self.link = Some(link);
        Ok(())
    }

    /// Return to Command mode, flushing pending keystrokes unless the device
    /// is already gone.
    async fn leave_serial(&mut self, notice: Option<String>) -> Result<()> {
        if let Some(mut link) = self.link.take() {
            if notice.is_none() {
                if let Err(e) = link.flush().await {
                    debug!(session_id = self.id, error = %e, "dropping keystrokes on leave");
                }
            }
            info!(session_id = self.id, port_id = link.port_id(), "serial link released");
        }
        self.enter_command(notice.as_deref()).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.link.take();
        if let Err(e) = self.ctx.sessions.unregister(self.id) {
            debug!(session_id = self.id, error = %e, "session already unregistered");
        }
    }
}

/// `None` if `cancel` fired first; `fut` is dropped in that case.
async fn until_cancelled<T>(cancel: &mut CancelSignal, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

async fn next_device_event(link: &mut Option<SerialLink>) -> DeviceEvent {
    match link {
        Some(link) => link.next_device_event().await,
        None => std::future::pending().await,
    }
}
