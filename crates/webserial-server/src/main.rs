//! webserial server binary entry point.
//!
//! Serves the web client and bridges browser terminals to serial ports.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use webserial_core::auth::{DigestVerifier, PasswordStore};
use webserial_core::error::{Error, Result};
use webserial_core::serial::TtyBackend;
use webserial_server::{AppContext, Cli, Server};

fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = webserial_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = cli.validate() {
        eprintln!("webserial-server: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "webserial-server starting");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(cli)) {
        error!(error = %e, "server failed");
        eprintln!("webserial-server: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let store = PasswordStore::load(&cli.pass_file)?;
    if store.is_empty() {
        warn!(path = %cli.pass_file.display(), "password file has no users; every login will fail");
    }
    let verifier = Arc::new(DigestVerifier::new(cli.realm.clone(), store));

    let escape_key = cli.escape_key().map_err(|message| Error::Config { message })?;
    let ctx = Arc::new(
        AppContext::new(Arc::new(TtyBackend::new()), escape_key).with_static_devices(cli.devices.clone()),
    );
    ctx.load_ports(!cli.no_scan);

    if !cli.root.is_dir() {
        warn!(root = %cli.root.display(), "static root is not a directory");
    }
    let server = Server::new(ctx, verifier, &cli.root).map_err(|e| Error::Config {
        message: e.to_string(),
    })?;

    let addr = cli.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, realm = %cli.realm, root = %cli.root.display(), "listening");

    webserial_server::serve_with_shutdown(listener, Arc::new(server), async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
    })
    .await
}
