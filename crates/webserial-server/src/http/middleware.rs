//! Middleware decorators.
//!
//! Each wraps a shared inner handler and forwards both `before_body` and
//! `handle`. None of them changes what another reads: digest auth only
//! writes `meta.username`, the header injector only adds its own headers,
//! and the logger only reads.

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, StatusCode};
use tracing::{debug, info};

use webserial_core::AuthError;
use webserial_core::auth::DigestVerifier;

use super::{Handler, Request, Response, SharedHandler};

/// Requires valid Digest credentials.
pub struct DigestAuth {
    verifier: Arc<DigestVerifier>,
    inner: SharedHandler,
}

impl DigestAuth {
    pub fn new(verifier: Arc<DigestVerifier>, inner: SharedHandler) -> Self {
        Self { verifier, inner }
    }

    fn authenticate(&self, req: &mut Request) -> Option<Response> {
        match self
            .verifier
            .verify(req.method.as_str(), req.authorization())
        {
            Ok(username) => {
                req.meta.username = Some(username);
                None
            }
            Err(err) => Some(self.reject(req, err)),
        }
    }

    fn reject(&self, req: &Request, err: AuthError) -> Response {
        debug!(
            source = %req.source,
            path = %req.path,
            malformed = err.is_malformed(),
            error = %err,
            "digest authentication failed"
        );
        Response::unauthorized(&self.verifier.challenge())
    }
}

#[async_trait]
impl Handler for DigestAuth {
    fn before_body(&self, req: &mut Request) -> Option<Response> {
        self.authenticate(req)
            .or_else(|| self.inner.before_body(req))
    }

    async fn handle(&self, req: &mut Request) -> Response {
        if req.meta.username.is_none() {
            if let Some(rejection) = self.authenticate(req) {
                return rejection;
            }
        }
        self.inner.handle(req).await
    }
}

/// Adds fixed headers to every response passing through.
pub struct ResponseHeaders {
    headers: Vec<(HeaderName, String)>,
    inner: SharedHandler,
}

impl ResponseHeaders {
    pub fn new(inner: SharedHandler) -> Self {
        Self {
            headers: Vec::new(),
            inner,
        }
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn decorate(&self, mut resp: Response) -> Response {
        for (name, value) in &self.headers {
            resp.set_header(name.clone(), value);
        }
        resp
    }
}

#[async_trait]
impl Handler for ResponseHeaders {
    fn before_body(&self, req: &mut Request) -> Option<Response> {
        self.inner.before_body(req).map(|r| self.decorate(r))
    }

    async fn handle(&self, req: &mut Request) -> Response {
        let resp = self.inner.handle(req).await;
        self.decorate(resp)
    }
}

/// Writes an NCSA common-log style line per response.
pub struct RequestLogger {
    inner: SharedHandler,
}

impl RequestLogger {
    pub fn new(inner: SharedHandler) -> Self {
        Self { inner }
    }
}

/// `{source} - {user|-} "{METHOD} {target} {version}" {status} {size}`
pub fn access_line(req: &Request, status: StatusCode, size: u64) -> String {
    format!(
        "{} - {} \"{} {} {:?}\" {} {}",
        req.source.ip(),
        req.username().unwrap_or("-"),
        req.method,
        req.target(),
        req.version,
        status.as_u16(),
        size
    )
}

fn log_access(req: &Request, resp: &Response) {
    info!(target: "webserial::access", "{}", access_line(req, resp.status, resp.body.len()));
}

#[async_trait]
impl Handler for RequestLogger {
    fn before_body(&self, req: &mut Request) -> Option<Response> {
        let resp = self.inner.before_body(req)?;
        log_access(req, &resp);
        Some(resp)
    }

    async fn handle(&self, req: &mut Request) -> Response {
        let resp = self.inner.handle(req).await;
        log_access(req, &resp);
        resp
    }
}
