use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use webserial_core::registry::{Port, SessionInfo};

use super::{Handler, Request, Response};
use crate::context::AppContext;

#[derive(Debug, Serialize)]
struct Snapshot {
    version: &'static str,
    ports: Vec<Port>,
    sessions: Vec<SessionInfo>,
}

/// JSON snapshot of the port and session registries.
pub struct StatusJson {
    ctx: Arc<AppContext>,
}

impl StatusJson {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Handler for StatusJson {
    async fn handle(&self, _req: &mut Request) -> Response {
        let snapshot = Snapshot {
            version: env!("CARGO_PKG_VERSION"),
            ports: self.ctx.ports.list(),
            sessions: self.ctx.sessions.list(),
        };
        match serde_json::to_string_pretty(&snapshot) {
            Ok(body) => Response::text(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!(error = %e, "failed to serialize status");
                Response::server_error()
            }
        }
    }
}
