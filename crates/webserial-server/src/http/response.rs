//! Response model and common responses.

use std::path::PathBuf;

use http::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::warn;

/// Response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Text(String),
    /// File streamed by the transport; `len` is taken when the response is
    /// built.
    File { path: PathBuf, len: u64 },
}

impl Body {
    /// Payload size in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Text(s) => s.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Body::Empty => "empty",
            Body::Text(_) => "text",
            Body::File { .. } => "file",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn text(status: StatusCode, content_type: &str, text: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(CONTENT_TYPE, content_type)
            .with_body(Body::Text(text.into()))
    }

    pub fn file(path: PathBuf, len: u64, content_type: &str) -> Self {
        Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, content_type)
            .with_body(Body::File { path, len })
    }

    pub fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "text/plain", "Not Found\n")
    }

    pub fn bad_request(reason: &str) -> Self {
        Self::text(StatusCode::BAD_REQUEST, "text/plain", format!("{reason}\n"))
    }

    pub fn server_error() -> Self {
        Self::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            "Internal Server Error\n",
        )
    }

    /// 401 carrying a `WWW-Authenticate` challenge.
    pub fn unauthorized(challenge: &str) -> Self {
        Self::text(StatusCode::UNAUTHORIZED, "text/plain", "Unauthorized\n")
            .with_header(WWW_AUTHENTICATE, challenge)
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Set a header, replacing any previous value. Values that are not valid
    /// header text are dropped with a warning.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, "dropping invalid header value"),
        }
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_lengths() {
        assert_eq!(Body::Empty.len(), 0);
        assert_eq!(Body::Text("abc".into()).len(), 3);
        let file = Body::File {
            path: PathBuf::from("/x"),
            len: 42,
        };
        assert_eq!(file.len(), 42);
        assert_eq!(file.kind(), "file");
    }

    #[test]
    fn unauthorized_has_challenge() {
        let resp = Response::unauthorized(r#"Digest realm="r", nonce="n""#);
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.header(WWW_AUTHENTICATE),
            Some(r#"Digest realm="r", nonce="n""#)
        );
    }

    #[test]
    fn invalid_header_value_dropped() {
        let resp = Response::new(StatusCode::OK).with_header(CONTENT_TYPE, "bad\nvalue");
        assert!(resp.header(CONTENT_TYPE).is_none());
    }
}
