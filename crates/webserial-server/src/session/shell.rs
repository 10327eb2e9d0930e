//! Command mode: line editor, history recall and the command vocabulary.
//!
//! The shell never touches the network. Output is buffered and collected by
//! the session with [`CommandShell::take_output`]. A successful `connect`
//! (typed or via the `open_port` APC directive) and `system refresh` are
//! handed back as a [`ShellAction`] for the session to carry out.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info, trace};

use webserial_core::History;
use webserial_core::constants::{CONTROL_MODE_NAME, PROMPT_LABEL};
use webserial_core::error::ResourceError;
use webserial_core::registry::{PortId, SessionId};
use webserial_core::serial::{FlowControl, Parity, PortOptions, StopBits};
use webserial_core::terminal::Event;
use webserial_core::terminal::ansi::{
    self, BEL, BS, CLEAR_SCREEN, CR, CRLF, CURSOR_HOME, DEL, ETX, LF, RUBOUT, Sgr, TAB,
};
use webserial_core::terminal::escape_key::describe_escape_key;

use super::table::Table;
use crate::context::{AppContext, RefreshReport};

/// Request from the shell that needs the session to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellAction {
    Connect(PortId),
    /// Rescan devices; the session prints the report and the prompt.
    Refresh,
}

/// `(command, arguments, description)`
const COMMANDS: &[(&str, &str, &str)] = &[
    ("help", "", "This help message"),
    ("list", "", "List available ports"),
    ("connect", "<port id>", "Connect to a port"),
    ("ports list", "", "List available ports"),
    ("ports add", "<device>", "Register a device with default settings"),
    ("ports set_speed", "<port id> <baud rate>", "Set port speed"),
    ("ports set_parity", "<port id> none|odd|even", "Set port parity"),
    (
        "ports set_flow_control",
        "<port id> none|hardware|software",
        "Set port flow control",
    ),
    ("ports set_character_size", "<port id> 5..8", "Set port character size"),
    ("ports set_stop_bits", "<port id> 1|1.5|2", "Set port stop bits"),
    ("session list", "", "List current sessions"),
    ("session kill", "<session id>", "Kill a session"),
    (
        "system refresh",
        "",
        "Rescan serial devices. Terminates existing serial connections",
    ),
    ("test bell", "", "Ring the terminal bell"),
];

fn parse<T: FromStr>(value: &str) -> Result<T, ResourceError> {
    value.parse().map_err(|_| ResourceError::BadValue)
}

/// Remove the last UTF-8 character. Returns false on an empty line.
fn pop_char(line: &mut Vec<u8>) -> bool {
    let Some(mut end) = line.len().checked_sub(1) else {
        return false;
    };
    while end > 0 && line[end] & 0xc0 == 0x80 {
        end -= 1;
    }
    line.truncate(end);
    true
}

fn char_count(line: &[u8]) -> usize {
    String::from_utf8_lossy(line).chars().count()
}

pub struct CommandShell {
    ctx: Arc<AppContext>,
    session_id: SessionId,
    line: Vec<u8>,
    history: History,
    out: Vec<u8>,
}

impl CommandShell {
    pub fn new(ctx: Arc<AppContext>, session_id: SessionId) -> Self {
        Self {
            ctx,
            session_id,
            line: Vec::new(),
            history: History::new(),
            out: Vec::new(),
        }
    }

    /// Output produced since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// The line being edited.
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    fn write(&mut self, data: impl AsRef<[u8]>) {
        self.out.extend_from_slice(data.as_ref());
    }

    pub fn prompt(&mut self) {
        let prompt = format!(
            "{}{}{}>{} ",
            ansi::sgr(&[Sgr::Bold, Sgr::Cyan]),
            PROMPT_LABEL,
            ansi::sgr(&[Sgr::White]),
            ansi::sgr(&[Sgr::Reset]),
        );
        self.write(prompt);
    }

    /// Inline error line.
    pub fn error(&mut self, message: impl Display) {
        let line = format!(
            "{} {}{}",
            ansi::styled(&[Sgr::Bold, Sgr::Red], "error:"),
            message,
            CRLF
        );
        self.write(line);
    }

    /// Draw the Command-mode screen. `notice` is shown as an error just
    /// above the prompt.
    pub fn enter(&mut self, notice: Option<&str>) {
        self.line.clear();
        self.write(CLEAR_SCREEN);
        self.write(CURSOR_HOME);
        self.write(ansi::set_title("Controller Session"));
        self.write(ansi::dcs('S', CONTROL_MODE_NAME));
        self.write(banner());
        self.write(ansi::styled(
            &[Sgr::Italic, Sgr::Dim],
            "Type \"help\" to begin...",
        ));
        self.write(CRLF);
        if let Some(notice) = notice {
            self.error(notice);
        }
        self.prompt();
    }

    pub fn on_event(&mut self, event: Event) -> Option<ShellAction> {
        match event {
            Event::Char(byte) => self.on_char(byte),
            Event::Csi(csi) => {
                match csi.final_byte {
                    b'A' => self.recall(true),
                    b'B' => self.recall(false),
                    _ => trace!(params = %csi.params_str(), final_byte = csi.final_byte, "ignoring CSI"),
                }
                None
            }
            Event::Dcs(msg) => {
                trace!(len = msg.len(), "ignoring DCS in command mode");
                None
            }
            Event::Apc(msg) => self.on_apc(&msg),
        }
    }

    fn on_char(&mut self, byte: u8) -> Option<ShellAction> {
        match byte {
            CR => return self.submit(),
            LF => {}
            DEL | BS => {
                if pop_char(&mut self.line) {
                    self.write(RUBOUT);
                }
            }
            ETX => {
                self.line.clear();
                self.write("^C");
                self.write(CRLF);
                self.prompt();
            }
            TAB => self.write([BEL]),
            b if b >= 0x20 => {
                self.line.push(b);
                self.write([b]);
            }
            b => trace!(byte = b, "dropping control byte"),
        }
        None
    }

    fn submit(&mut self) -> Option<ShellAction> {
        self.write(CRLF);
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.line)).into_owned();
        let action = self.execute(&line);
        if action.is_none() {
            self.prompt();
        }
        action
    }

    /// Replace the edited line with a history entry.
    fn recall(&mut self, older: bool) {
        let recalled = if older {
            self.history.previous().to_string()
        } else {
            self.history.next().to_string()
        };
        for _ in 0..char_count(&self.line) {
            self.write(RUBOUT);
        }
        self.write(&recalled);
        self.line = recalled.into_bytes();
    }

    fn on_apc(&mut self, msg: &[u8]) -> Option<ShellAction> {
        let msg = String::from_utf8_lossy(msg);
        match msg.split_once('=') {
            Some(("open_port", value)) => match parse::<PortId>(value.trim()) {
                Ok(id) => {
                    debug!(session_id = self.session_id, port_id = id, "open_port directive");
                    Some(ShellAction::Connect(id))
                }
                Err(e) => {
                    self.write(CRLF);
                    self.error(format!("Bad port id '{value}': {e}"));
                    self.prompt();
                    None
                }
            },
            _ => {
                debug!(session_id = self.session_id, directive = %msg, "ignoring APC directive");
                None
            }
        }
    }

    /// Run one command line. Output goes to the buffer; the prompt is left to
    /// the caller.
    pub fn execute(&mut self, line: &str) -> Option<ShellAction> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.history.append(line);
        debug!(session_id = self.session_id, command = %line, "execute");

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["help"] => self.help(),
            ["list"] | ["ports", "list"] => self.list_ports(),
            ["connect", id] => match parse::<PortId>(id) {
                Ok(id) => return Some(ShellAction::Connect(id)),
                Err(e) => self.error(format!("Bad port id '{id}': {e}")),
            },
            ["ports", "add", device] => match self.ctx.ports.add(*device, PortOptions::default()) {
                Ok(id) => self.write(format!("Added port {id} for {device}{CRLF}")),
                Err(e) => self.error(format!("Could not add {device}: {e}")),
            },
            ["ports", "set_speed", id, value] => {
                self.set_port::<u32, _>("speed", id, value, |ctx, id, v| ctx.ports.set_speed(id, v))
            }
            ["ports", "set_parity", id, value] => {
                self.set_port::<Parity, _>("parity", id, value, |ctx, id, v| ctx.ports.set_parity(id, v))
            }
            ["ports", "set_flow_control", id, value] => self
                .set_port::<FlowControl, _>("flow control", id, value, |ctx, id, v| {
                    ctx.ports.set_flow_control(id, v)
                }),
            ["ports", "set_character_size", id, value] => self
                .set_port::<u8, _>("character size", id, value, |ctx, id, v| {
                    ctx.ports.set_character_size(id, v)
                }),
            ["ports", "set_stop_bits", id, value] => self
                .set_port::<StopBits, _>("stop bits", id, value, |ctx, id, v| {
                    ctx.ports.set_stop_bits(id, v)
                }),
            ["session", "list"] => self.list_sessions(),
            ["session", "kill", id] => self.kill(id),
            ["system", "refresh"] => return Some(ShellAction::Refresh),
            ["test", "bell"] => self.write([BEL]),
            _ => self.unknown(&parts, line),
        }
        None
    }

    fn unknown(&mut self, parts: &[&str], line: &str) {
        // A known command with the wrong number of arguments.
        let usage = COMMANDS.iter().find(|(name, _, _)| {
            let words: Vec<&str> = name.split(' ').collect();
            parts.len() >= words.len() && parts[..words.len()] == words[..]
        });
        match usage {
            Some((name, args, _)) => {
                let usage = format!("{name} {args}");
                self.error(format!("{}. Usage: {}", ResourceError::BadValue, usage.trim_end()))
            }
            None => self.error(format!("Command {line} not found")),
        }
    }

    fn set_port<T, F>(&mut self, what: &str, id: &str, value: &str, apply: F)
    where
        T: FromStr,
        F: FnOnce(&AppContext, PortId, T) -> Result<(), ResourceError>,
    {
        let result = parse::<PortId>(id).and_then(|port| {
            let parsed = parse::<T>(value)?;
            apply(self.ctx.as_ref(), port, parsed)
        });
        match result {
            Ok(()) => {
                info!(session_id = self.session_id, port = %id, setting = what, value = %value, "port setting changed");
                self.write(format!("Port {id} {what} set to {value}{CRLF}"));
            }
            Err(e) => self.error(format!("Could not set {what} on port {id}: {e}")),
        }
    }

    fn help(&mut self) {
        let mut text = format!("Commands available:{CRLF}");
        for (name, args, description) in COMMANDS {
            let usage = if args.is_empty() {
                name.to_string()
            } else {
                format!("{name} {args}")
            };
            text.push_str(&format!("  {usage:<48} {description}{CRLF}"));
        }
        text.push_str(&format!(
            "In a serial session, type {} to return here.{CRLF}",
            describe_escape_key(self.ctx.escape_key)
        ));
        self.write(text);
    }

    fn list_ports(&mut self) {
        let mut table = Table::new(&["ID", "Device", "Baud", "CS", "FC", "Parity", "SB", "In Use"]);
        for port in self.ctx.ports.list() {
            let opts = port.options;
            table.row(vec![
                port.id.to_string(),
                port.device,
                opts.baud_rate.to_string(),
                opts.character_size.to_string(),
                opts.flow_control.to_string(),
                opts.parity.to_string(),
                opts.stop_bits.to_string(),
                if port.in_use { "yes" } else { "no" }.to_string(),
            ]);
        }
        self.write(table.render());
    }

    fn list_sessions(&mut self) {
        let mut table = Table::new(&["ID", "User", "Address", "State", "Device"]);
        for info in self.ctx.sessions.list() {
            let mut id = info.id.to_string();
            if info.id == self.session_id {
                id.push_str(" (you)");
            }
            table.row(vec![
                id,
                info.username,
                info.remote_address,
                info.mode.to_string(),
                info.device,
            ]);
        }
        self.write(table.render());
    }

    fn kill(&mut self, id: &str) {
        let result = parse::<SessionId>(id).and_then(|id| self.ctx.sessions.cancel(id));
        match result {
            Ok(()) => {
                info!(session_id = self.session_id, target = %id, "session kill requested");
                self.write(format!("Session {id} terminated{CRLF}"));
            }
            Err(e) => self.error(format!("Could not kill session {id}: {e}")),
        }
    }

    pub fn report_refresh(&mut self, report: &RefreshReport) {
        self.write(format!(
            "Rescanned: {} added, {} removed, {} still in use; {} serial session(s) ended{CRLF}",
            report.ports.added, report.ports.removed, report.ports.retained, report.evicted
        ));
    }
}

fn banner() -> String {
    format!(
        "{}webserial{} {}{CRLF}Serial port multiplexer{CRLF}{CRLF}",
        ansi::sgr(&[Sgr::Bold, Sgr::Cyan]),
        ansi::sgr(&[Sgr::Reset]),
        env!("CARGO_PKG_VERSION"),
    )
}
