//! wspasswd: add or replace a user in a webserial password file.
//!
//! Lines are `user:realm:HA1` with `HA1 = MD5(user:realm:password)`.

use std::io::{self, BufRead, IsTerminal, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use tracing::{info, warn};

use webserial_core::LogFormat;
use webserial_core::auth::{PasswordStore, ha1};
use webserial_core::constants::DEFAULT_REALM;
use webserial_core::error::{Error, Result};

/// wspasswd - manage webserial digest credentials.
#[derive(Debug, Parser)]
#[command(name = "wspasswd", version, about = "Add or replace a user in a webserial password file")]
struct Args {
    /// Password file to update (created if missing)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// User name
    #[arg(value_name = "USER")]
    user: String,

    /// Digest realm
    #[arg(long = "realm", default_value = DEFAULT_REALM)]
    realm: String,

    /// Password. Omit for an interactive prompt with echo disabled
    #[arg(long = "password")]
    password: Option<String>,

    /// Increase verbosity
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

/// Turns terminal echo off until dropped.
struct EchoGuard {
    saved: Termios,
}

impl EchoGuard {
    fn disable() -> nix::Result<Self> {
        let stdin = io::stdin();
        let saved = termios::tcgetattr(stdin.as_fd())?;
        let mut quiet = saved.clone();
        quiet.local_flags.remove(LocalFlags::ECHO);
        termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &quiet)?;
        Ok(Self { saved })
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(io::stdin().as_fd(), SetArg::TCSANOW, &self.saved) {
            warn!(error = %e, "could not restore terminal echo");
        }
    }
}

fn read_line(prompt: &str) -> Result<String> {
    let interactive = io::stdin().is_terminal();
    if interactive {
        eprint!("{prompt}");
        io::stderr().flush()?;
    }
    let _guard = if interactive {
        match EchoGuard::disable() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "could not disable terminal echo");
                None
            }
        }
    } else {
        None
    };

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    if interactive {
        eprintln!();
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_password() -> Result<String> {
    let first = read_line("password: ")?;
    if !io::stdin().is_terminal() {
        return Ok(first);
    }
    let second = read_line("again: ")?;
    if first != second {
        return Err(Error::Config {
            message: "passwords do not match".to_string(),
        });
    }
    Ok(first)
}

fn validate(args: &Args) -> Result<()> {
    for (what, value) in [("user", &args.user), ("realm", &args.realm)] {
        if value.is_empty() || value.contains(':') || value.contains('\n') {
            return Err(Error::Config {
                message: format!("invalid {what} '{value}'"),
            });
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    validate(&args)?;

    let mut store = if args.file.exists() {
        PasswordStore::load(&args.file)?
    } else {
        PasswordStore::new()
    };

    let password = match args.password {
        Some(ref password) => password.clone(),
        None => read_password()?,
    };
    if password.is_empty() {
        return Err(Error::Config {
            message: "empty password".to_string(),
        });
    }

    let replaced = store.lookup(&args.realm, &args.user).is_some();
    store.insert(&args.user, &args.realm, &ha1(&args.user, &args.realm, &password));
    store.save(&args.file)?;
    info!(
        path = %args.file.display(),
        user = %args.user,
        realm = %args.realm,
        replaced,
        "password file updated"
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = webserial_core::init_logging(args.verbose, None, LogFormat::Text) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        eprintln!("wspasswd: {}", e);
        std::process::exit(1);
    }
}
