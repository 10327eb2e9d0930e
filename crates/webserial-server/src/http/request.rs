//! Request model seen by handlers.

use std::net::SocketAddr;

use http::header::{AUTHORIZATION, CONNECTION, UPGRADE};
use http::{HeaderMap, Method, Version};

/// Per-request metadata written by middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Set by digest authentication on success.
    pub username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path component only; no URL decoding is applied.
    pub path: String,
    pub query: Option<String>,
    pub version: Version,
    pub headers: HeaderMap,
    pub source: SocketAddr,
    pub meta: RequestMeta,
}

impl Request {
    pub fn new(method: Method, target: &str, source: SocketAddr) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            source,
            meta: RequestMeta::default(),
        }
    }

    /// Build from the head of an incoming HTTP request.
    pub fn from_parts(parts: &http::request::Parts, source: SocketAddr) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            version: parts.version,
            headers: parts.headers.clone(),
            source,
            meta: RequestMeta::default(),
        }
    }

    pub fn with_header(mut self, name: http::HeaderName, value: &str) -> Self {
        if let Ok(value) = http::HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Path plus query, as it appeared on the request line.
    pub fn target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header(AUTHORIZATION)
    }

    /// True when the client asked for a websocket upgrade.
    pub fn is_upgrade(&self) -> bool {
        let upgrade = self
            .header(UPGRADE)
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection = self.header(CONNECTION).is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        upgrade && connection
    }

    pub fn username(&self) -> Option<&str> {
        self.meta.username.as_deref()
    }
}
