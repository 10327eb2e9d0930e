//! Server CLI implementation.
//!
//! Provides command-line argument parsing for the webserial server.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use webserial_core::constants::{DEFAULT_HTTP_PORT, DEFAULT_REALM};
use webserial_core::terminal::parse_escape_key;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for webserial_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => webserial_core::LogFormat::Text,
            CliLogFormat::Json => webserial_core::LogFormat::Json,
        }
    }
}

/// webserial server - browser terminals for host serial ports.
#[derive(Debug, Parser)]
#[command(
    name = "webserial-server",
    version,
    about = "webserial server - browser terminals for host serial ports"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Password file (user:realm:HA1 lines, see wspasswd)
    #[arg(long = "pass-file", value_name = "FILE", env = "WEBSERIAL_PASS_FILE")]
    pub pass_file: PathBuf,

    /// Directory with the web client
    #[arg(long = "root", value_name = "DIR", default_value = "site")]
    pub root: PathBuf,

    /// Digest authentication realm
    #[arg(long = "realm", default_value = DEFAULT_REALM)]
    pub realm: String,

    /// Serial device to register in addition to discovered ones (repeatable)
    #[arg(long = "device", action = ArgAction::Append, value_name = "PATH")]
    pub devices: Vec<String>,

    /// Skip scanning /dev/serial/by-path
    #[arg(long = "no-scan")]
    pub no_scan: bool,

    /// Key that leaves a serial session (ctrl+<key>)
    #[arg(long = "escape-key", default_value = "ctrl+q", value_name = "KEY")]
    pub escape_key: String,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Get the socket address to bind to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// The escape key as a control byte.
    pub fn escape_key(&self) -> Result<u8, String> {
        parse_escape_key(&self.escape_key)
    }

    /// Check option combinations clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        self.escape_key()?;
        if self.realm.is_empty() || self.realm.contains('"') || self.realm.contains(':') {
            return Err(format!("invalid realm '{}'", self.realm));
        }
        if let Some(device) = self.devices.iter().find(|d| d.is_empty()) {
            return Err(format!("invalid device '{device}'"));
        }
        Ok(())
    }
}
