//! axum front end.
//!
//! Every request goes through one fallback handler that converts it into the
//! pipeline's [`Request`], runs the router's `before_body` pass, and then
//! either upgrades to a WebSocket terminal or lets the router produce a
//! response. The terminal bridge runs one reader and one writer task per
//! socket around a [`Session`].

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webserial_core::auth::DigestVerifier;
use webserial_core::constants::{INBOUND_QUEUE_DEPTH, OUTBOUND_QUEUE_DEPTH};
use webserial_core::error::{Error, Result};

use crate::app::build_router;
use crate::context::AppContext;
use crate::http::{Body, Request, Response, RouteError, Router};
use crate::session::{Outbound, Session};

/// Everything the front end needs per request.
pub struct Server {
    router: Router,
    ctx: Arc<AppContext>,
    verifier: Arc<DigestVerifier>,
}

impl Server {
    pub fn new(ctx: Arc<AppContext>, verifier: Arc<DigestVerifier>, root: &Path) -> std::result::Result<Self, RouteError> {
        let router = build_router(ctx.clone(), verifier.clone(), root)?;
        Ok(Self::with_router(router, ctx, verifier))
    }

    pub fn with_router(router: Router, ctx: Arc<AppContext>, verifier: Arc<DigestVerifier>) -> Self {
        Self {
            router,
            ctx,
            verifier,
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, server: Arc<Server>) -> Result<()> {
    serve_with_shutdown(listener, server, std::future::pending()).await
}

/// Serve until `shutdown` resolves. Open terminal sessions are not waited for.
pub async fn serve_with_shutdown<F>(listener: TcpListener, server: Arc<Server>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = axum::Router::new().fallback(dispatch).with_state(server);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Transport {
            message: e.to_string(),
        })?;
    Ok(())
}

async fn dispatch(
    State(server): State<Arc<Server>>,
    ConnectInfo(source): ConnectInfo<SocketAddr>,
    req: axum::extract::Request,
) -> axum::response::Response {
    let (mut parts, _body) = req.into_parts();
    let mut request = Request::from_parts(&parts, source);

    if let Some(resp) = server.router.before_body(&mut request) {
        return render(resp).await;
    }

    if request.is_upgrade() && server.router.matches(&request.method, &request.path) {
        let Some(username) = request.meta.username.clone() else {
            debug!(source = %source, path = %request.path, "upgrade on unauthenticated route");
            return render(Response::unauthorized(&server.verifier.challenge())).await;
        };
        return match <WebSocketUpgrade as FromRequestParts<()>>::from_request_parts(&mut parts, &()).await {
            Ok(ws) => {
                info!(user = %username, source = %source, path = %request.path, "terminal upgrade");
                let ctx = server.ctx.clone();
                ws.on_upgrade(move |socket| run_terminal(socket, ctx, username, source))
            }
            Err(rejection) => rejection.into_response(),
        };
    }

    let resp = server.router.handle(&mut request).await;
    render(resp).await
}

/// Convert a pipeline response, reading file bodies from disk.
async fn render(resp: Response) -> axum::response::Response {
    let body = match resp.body {
        Body::Empty => axum::body::Body::empty(),
        Body::Text(text) => axum::body::Body::from(text),
        Body::File { path, .. } => match tokio::fs::read(&path).await {
            Ok(data) => axum::body::Body::from(data),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n").into_response();
            }
        },
    };
    let mut out = axum::response::Response::new(body);
    *out.status_mut() = resp.status;
    *out.headers_mut() = resp.headers;
    out
}

async fn run_terminal(socket: WebSocket, ctx: Arc<AppContext>, username: String, source: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_DEPTH);
    let (in_tx, in_rx) = mpsc::channel::<Bytes>(INBOUND_QUEUE_DEPTH);

    // Single writer: frames go out in queue order, one at a time.
    let writer = tokio::spawn(async move {
        while let Some(chunk) = out_rx.recv().await {
            if ws_tx.send(Message::Binary(chunk.to_vec())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            let data = match msg {
                Ok(Message::Binary(data)) => Bytes::from(data),
                Ok(Message::Text(text)) => Bytes::from(text),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
            };
            if in_tx.send(data).await.is_err() {
                break;
            }
        }
    });

    let (session, cancel) = Session::new(ctx, &username, &source.to_string(), Outbound::new(out_tx));
    let id = session.id();
    match session.run(in_rx, cancel).await {
        Ok(()) => info!(session_id = id, user = %username, "session ended"),
        Err(e) if e.is_fatal() => debug!(session_id = id, user = %username, error = %e, "terminal went away"),
        Err(e) => warn!(session_id = id, user = %username, error = %e, "session ended with error"),
    }

    reader.abort();
    let _ = writer.await;
}
