//! Static content and the fixed pages around it.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use webserial_core::auth::DigestVerifier;
use webserial_core::constants::DEFAULT_MIME_TYPE;

use super::{Body, Handler, Request, Response};

/// Content type for a file name, by extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("htm") | Some("html") | Some("php") => "text/html",
        Some("css") => "text/css",
        Some("txt") => "text/plain",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("swf") => "application/x-shockwave-flash",
        Some("flv") => "video/x-flv",
        Some("png") => "image/png",
        Some("jpe") | Some("jpeg") | Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("ico") => "image/vnd.microsoft.icon",
        Some("tiff") | Some("tif") => "image/tiff",
        Some("svg") | Some("svgz") => "image/svg+xml",
        Some("wasm") => "application/wasm",
        Some("map") => "application/json",
        _ => DEFAULT_MIME_TYPE,
    }
}

/// Map a request path onto `root`. Returns `None` for paths that try to
/// leave the root.
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    let mut out = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Serves files below a root directory; directories map to `index.html`.
pub struct ServeFiles {
    root: PathBuf,
}

impl ServeFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Handler for ServeFiles {
    async fn handle(&self, req: &mut Request) -> Response {
        if req.path.split('/').any(|seg| seg == "..") {
            return Response::bad_request("Illegal request-target");
        }
        let Some(mut path) = resolve(&self.root, &req.path) else {
            return Response::bad_request("Illegal request-target");
        };

        let mut meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(_) => return Response::not_found(),
        };
        if meta.is_dir() {
            path.push("index.html");
            meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(_) => return Response::not_found(),
            };
        }
        if !meta.is_file() {
            return Response::not_found();
        }

        debug!(path = %path.display(), len = meta.len(), "serving file");
        let content_type = mime_type_for(&path);
        Response::file(path, meta.len(), content_type)
    }
}

/// Always answers 401 so the browser forgets cached credentials.
pub struct Logout {
    verifier: Arc<DigestVerifier>,
    page: PathBuf,
}

impl Logout {
    /// `page` is shown as the body when it exists.
    pub fn new(verifier: Arc<DigestVerifier>, page: impl Into<PathBuf>) -> Self {
        Self {
            verifier,
            page: page.into(),
        }
    }
}

#[async_trait]
impl Handler for Logout {
    async fn handle(&self, _req: &mut Request) -> Response {
        let mut resp = Response::unauthorized(&self.verifier.challenge());
        if let Ok(meta) = tokio::fs::metadata(&self.page).await {
            if meta.is_file() {
                resp.set_header(http::header::CONTENT_TYPE, mime_type_for(&self.page));
                resp.body = Body::File {
                    path: self.page.clone(),
                    len: meta.len(),
                };
            }
        }
        debug_assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        resp
    }
}
