//! Method + path routing with exact and longest-prefix matches.
//!
//! Paths are compared byte for byte, case-sensitively, with no decoding. A
//! prefix route matches any path that starts with its literal text, so
//! `/assets` also matches `/assetsfoo`.

use std::collections::{BTreeMap, HashMap};

use http::Method;
use thiserror::Error;
use tracing::trace;

use super::{Request, Response, SharedHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route {method} {path} registered twice")]
    Duplicate { method: Method, path: String },
}

struct Route {
    kind: MatchKind,
    handler: SharedHandler,
}

#[derive(Default)]
pub struct Router {
    tables: HashMap<Method, BTreeMap<String, Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Each method/path literal may be registered once,
    /// whatever its match kind.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        kind: MatchKind,
        handler: SharedHandler,
    ) -> Result<&mut Self, RouteError> {
        let table = self.tables.entry(method.clone()).or_default();
        if table.contains_key(path) {
            return Err(RouteError::Duplicate {
                method,
                path: path.to_string(),
            });
        }
        table.insert(path.to_string(), Route { kind, handler });
        Ok(self)
    }

    pub fn get(
        &mut self,
        path: &str,
        kind: MatchKind,
        handler: SharedHandler,
    ) -> Result<&mut Self, RouteError> {
        self.route(Method::GET, path, kind, handler)
    }

    /// Find the handler for a request: an exact route on the full path, or
    /// else the longest prefix route.
    pub fn find(&self, method: &Method, path: &str) -> Option<(&str, &SharedHandler)> {
        let table = self.tables.get(method)?;
        for end in (0..=path.len()).rev() {
            if !path.is_char_boundary(end) {
                continue;
            }
            if let Some((key, route)) = table.get_key_value(&path[..end]) {
                if route.kind == MatchKind::Prefix || end == path.len() {
                    return Some((key.as_str(), &route.handler));
                }
            }
        }
        None
    }

    /// First pass: lets middleware answer before an upgrade or body is
    /// handled. Unmatched requests pass through and get their 404 from
    /// [`handle`](Self::handle).
    pub fn before_body(&self, req: &mut Request) -> Option<Response> {
        let (route, handler) = self.find(&req.method, &req.path)?;
        trace!(route, path = %req.path, "before_body");
        handler.before_body(req)
    }

    pub async fn handle(&self, req: &mut Request) -> Response {
        match self.find(&req.method, &req.path) {
            Some((route, handler)) => {
                trace!(route, path = %req.path, "dispatch");
                handler.handle(req).await
            }
            None => Response::not_found(),
        }
    }

    /// True when the request is routed through a handler at all.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.find(method, path).is_some()
    }
}
