//! End-to-end session tests: a scripted terminal drives a real session over
//! the fake serial backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use webserial_core::error::Result;
use webserial_core::registry::SessionMode;
use webserial_server::{AppContext, Outbound, Session};
use webserial_test_utils::{FakeDevice, FakeSerialBackend, FakeTerminal, TerminalChannels};

const WAIT: Duration = Duration::from_secs(2);
const PROMPT: &str = "webserial\x1b[37m>";

struct Harness {
    ctx: Arc<AppContext>,
    backend: Arc<FakeSerialBackend>,
    opened: mpsc::UnboundedReceiver<FakeDevice>,
}

impl Harness {
    fn new(devices: &[&str]) -> Self {
        let backend = Arc::new(FakeSerialBackend::with_devices(devices));
        let opened = backend.take_opened_receiver().unwrap();
        let ctx = Arc::new(AppContext::new(backend.clone(), 0x11));
        ctx.load_ports(true);
        Self { ctx, backend, opened }
    }

    async fn open(&self, user: &str) -> (FakeTerminal, u64, JoinHandle<Result<()>>) {
        self.open_with(user, FakeTerminal::new()).await
    }

    async fn open_with(
        &self,
        user: &str,
        (mut term, chans): (FakeTerminal, TerminalChannels),
    ) -> (FakeTerminal, u64, JoinHandle<Result<()>>) {
        let (session, cancel) = Session::new(self.ctx.clone(), user, "127.0.0.1:5000", Outbound::new(chans.outbound));
        let id = session.id();
        let handle = tokio::spawn(session.run(chans.inbound, cancel));
        assert!(term.expect(PROMPT, WAIT).await);
        (term, id, handle)
    }

    async fn device(&mut self) -> FakeDevice {
        tokio::time::timeout(WAIT, self.opened.recv()).await.unwrap().unwrap()
    }

    fn in_use(&self, id: u32) -> bool {
        self.ctx.ports.get(id).unwrap().in_use
    }

    fn mode(&self, session: u64) -> SessionMode {
        self.ctx.sessions.get(session).unwrap().mode
    }
}

#[tokio::test]
async fn connect_forward_and_escape() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, id, _task) = h.open("alice").await;
    assert_eq!(h.mode(id), SessionMode::Control);

    term.run_command("connect 1").await;
    assert!(term.expect("Connected.", WAIT).await);
    assert!(term.expect("Type Ctrl + q to exit", WAIT).await);
    assert!(h.in_use(1));
    assert_eq!(h.mode(id), SessionMode::Serial);
    assert_eq!(h.ctx.sessions.get(id).unwrap().device, "/dev/ttyUSB0");

    let mut device = h.device().await;
    term.type_string("AT\r").await;
    assert_eq!(device.read_at_least(3, WAIT).await, b"AT\r");

    device.write(b"OK\r\n").await;
    assert!(term.expect("OK\r\n", WAIT).await);

    term.press_ctrl_q().await;
    assert!(term.expect(PROMPT, WAIT).await);
    assert!(!h.in_use(1));
    assert_eq!(h.mode(id), SessionMode::Control);
    assert!(device.is_closed(WAIT).await);
}

#[tokio::test]
async fn connect_to_busy_port_stays_in_command_mode() {
    let h = Harness::new(&["/dev/ttyUSB0"]);
    let _lease = h.ctx.ports.acquire(1).unwrap();
    let (mut term, id, _task) = h.open("bob").await;

    term.run_command("connect 1").await;
    assert!(term.expect("Port with id 1 is in use", WAIT).await);
    assert!(term.expect(PROMPT, WAIT).await);
    assert_eq!(h.mode(id), SessionMode::Control);
}

#[tokio::test]
async fn connect_to_unknown_port() {
    let h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, _id, _task) = h.open("bob").await;

    term.run_command("connect 7").await;
    assert!(term.expect("Unable to find port with id 7", WAIT).await);
}

#[tokio::test]
async fn apc_open_port_connects() {
    let mut h = Harness::new(&["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    let (mut term, id, _task) = h.open("carol").await;

    term.send_apc("open_port=2").await;
    assert!(term.expect("Connected.", WAIT).await);
    let device = h.device().await;
    assert_eq!(device.device, "/dev/ttyUSB1");
    assert!(h.in_use(2));
    assert_eq!(h.mode(id), SessionMode::Serial);
}

#[tokio::test]
async fn escape_key_followed_by_command_in_one_frame() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, _id, _task) = h.open("alice").await;

    term.run_command("connect 1").await;
    assert!(term.expect("Connected.", WAIT).await);
    let _device = h.device().await;

    term.send(b"\x11help\r").await;
    assert!(term.expect("Commands available:", WAIT).await);
    assert!(!h.in_use(1));
}

#[tokio::test]
async fn kill_releases_port_and_unregisters() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut victim, victim_id, victim_task) = h.open("alice").await;
    let (mut admin, _admin_id, _admin_task) = h.open("root").await;

    victim.run_command("connect 1").await;
    assert!(victim.expect("Connected.", WAIT).await);
    let mut device = h.device().await;
    assert!(h.in_use(1));

    admin.run_command(&format!("session kill {victim_id}")).await;
    assert!(admin.expect(&format!("Session {victim_id} terminated"), WAIT).await);

    assert!(victim.expect("Session terminated", WAIT).await);
    tokio::time::timeout(WAIT, victim_task).await.unwrap().unwrap().unwrap();
    assert!(victim.closed(WAIT).await);
    assert!(device.is_closed(WAIT).await);

    assert!(!h.in_use(1));
    assert!(h.ctx.sessions.get(victim_id).is_err());
    assert_eq!(h.ctx.sessions.len(), 1);

    // The port is free for the next user.
    admin.run_command("connect 1").await;
    assert!(admin.expect("Connected.", WAIT).await);
}

#[tokio::test]
async fn disconnect_in_serial_mode_releases_port() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, id, task) = h.open("alice").await;

    term.run_command("connect 1").await;
    assert!(term.expect("Connected.", WAIT).await);
    let _device = h.device().await;

    term.disconnect();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert!(!h.in_use(1));
    assert!(h.ctx.sessions.get(id).is_err());
}

#[tokio::test]
async fn device_eof_returns_to_command_mode() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, id, _task) = h.open("alice").await;

    term.run_command("connect 1").await;
    assert!(term.expect("Connected.", WAIT).await);
    let device = h.device().await;

    drop(device);
    assert!(term.expect("Serial device /dev/ttyUSB0 closed", WAIT).await);
    assert!(term.expect(PROMPT, WAIT).await);
    assert!(!h.in_use(1));
    assert_eq!(h.mode(id), SessionMode::Control);
}

#[tokio::test]
async fn history_recall_across_commands() {
    let h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, _id, _task) = h.open("alice").await;

    term.run_command("list").await;
    assert!(term.expect("/dev/ttyUSB0", WAIT).await);
    term.run_command("help").await;
    assert!(term.expect("Commands available:", WAIT).await);
    let _ = term.drain(Duration::from_millis(50)).await;

    term.press_up().await;
    term.press_up().await;
    term.press_enter().await;
    assert!(term.expect("| ID |", WAIT).await);
}

#[tokio::test]
async fn unknown_command_reports_error() {
    let h = Harness::new(&[]);
    let (mut term, _id, _task) = h.open("alice").await;

    term.run_command("frobnicate").await;
    assert!(term.expect("Command frobnicate not found", WAIT).await);
    assert!(term.expect(PROMPT, WAIT).await);
}

#[tokio::test]
async fn refresh_ends_serial_sessions() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut serial, serial_id, serial_task) = h.open("alice").await;
    let (mut admin, _admin_id, _admin_task) = h.open("root").await;

    serial.run_command("connect 1").await;
    assert!(serial.expect("Connected.", WAIT).await);
    let _device = h.device().await;

    admin.run_command("system refresh").await;
    assert!(admin.expect("1 serial session(s) ended", WAIT).await);

    assert!(serial.expect("Session terminated", WAIT).await);
    tokio::time::timeout(WAIT, serial_task).await.unwrap().unwrap().unwrap();
    assert!(h.ctx.sessions.get(serial_id).is_err());
    let ports = h.ctx.ports.list();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].device, "/dev/ttyUSB0");
    assert!(!ports[0].in_use);
}

#[tokio::test]
async fn kill_while_terminal_stalled_releases_port() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, id, task) = h
        .open_with("alice", FakeTerminal::with_output_capacity(1))
        .await;

    term.run_command("connect 1").await;
    assert!(term.expect("Connected.", WAIT).await);
    let mut device = h.device().await;

    // The browser stops reading; device output backs up behind it.
    for n in 0..8 {
        device.write(format!("line {n}\r\n").as_bytes()).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    h.ctx.sessions.cancel(id).unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert!(!h.in_use(1));
    assert!(h.ctx.sessions.get(id).is_err());
    drop(term);
}

#[tokio::test]
async fn refresh_while_terminal_stalled_evicts_session() {
    let mut h = Harness::new(&["/dev/ttyUSB0"]);
    let (mut term, id, task) = h
        .open_with("alice", FakeTerminal::with_output_capacity(1))
        .await;
    let (mut admin, _admin_id, _admin_task) = h.open("root").await;

    term.run_command("connect 1").await;
    assert!(term.expect("Connected.", WAIT).await);
    let mut device = h.device().await;
    for n in 0..8 {
        device.write(format!("line {n}\r\n").as_bytes()).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    admin.run_command("system refresh").await;
    assert!(admin.expect("1 serial session(s) ended", WAIT).await);
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert!(h.ctx.sessions.get(id).is_err());
    assert!(h.ctx.ports.list().iter().all(|p| !p.in_use));
}

#[tokio::test]
async fn failed_open_returns_session_to_control() {
    let h = Harness::new(&["/dev/ttyUSB0"]);
    h.backend.fail_open("/dev/ttyUSB0", "permission denied");
    let (mut term, id, _task) = h.open("alice").await;

    term.run_command("connect 1").await;
    assert!(term.expect("Error creating port: serial error: permission denied", WAIT).await);
    assert!(term.expect(PROMPT, WAIT).await);
    assert!(!h.in_use(1));
    let info = h.ctx.sessions.get(id).unwrap();
    assert_eq!(info.mode, SessionMode::Control);
    assert_eq!(info.device, "");
}
