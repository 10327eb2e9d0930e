//! webserial-server: Server library for the webserial multiplexer.
//!
//! Provides:
//! - HTTP pipeline (router, digest auth, static files, status)
//! - WebSocket transport on axum
//! - Terminal sessions switching between the command shell and serial
//!   pass-through
//! - Application context shared by every connection

pub mod app;
pub mod cli;
pub mod context;
pub mod http;
pub mod session;
pub mod transport;

pub use app::build_router;
pub use cli::{Cli, CliLogFormat};
pub use context::{AppContext, RefreshReport};
pub use session::{Outbound, Session};
pub use transport::{Server, serve, serve_with_shutdown};
