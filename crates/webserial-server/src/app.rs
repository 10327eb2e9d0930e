//! Route table.

use std::path::Path;
use std::sync::Arc;

use http::HeaderName;

use webserial_core::auth::DigestVerifier;
use webserial_core::constants::CLACKS_OVERHEAD;

use crate::context::AppContext;
use crate::http::{
    DigestAuth, Logout, MatchKind, RequestLogger, ResponseHeaders, RouteError, Router, ServeFiles,
    SharedHandler, StatusJson,
};

fn decorate(inner: SharedHandler) -> SharedHandler {
    Arc::new(
        ResponseHeaders::new(Arc::new(RequestLogger::new(inner)))
            .header(HeaderName::from_static("x-clacks-overhead"), CLACKS_OVERHEAD),
    )
}

/// Build the routes:
///
/// | path      | match  | chain                              |
/// |-----------|--------|------------------------------------|
/// | `/`       | prefix | digest, headers, log, static files |
/// | `/assets` | prefix | headers, log, static files         |
/// | `/pages`  | prefix | headers, log, static files         |
/// | `/logout` | exact  | headers, log, forced 401           |
/// | `/status` | exact  | digest, headers, log, JSON         |
///
/// WebSocket upgrades are accepted on any digest-guarded route.
pub fn build_router(
    ctx: Arc<AppContext>,
    verifier: Arc<DigestVerifier>,
    root: &Path,
) -> Result<Router, RouteError> {
    let files: SharedHandler = Arc::new(ServeFiles::new(root));
    let public = decorate(files.clone());
    let private: SharedHandler = Arc::new(DigestAuth::new(verifier.clone(), decorate(files)));
    let logout = decorate(Arc::new(Logout::new(
        verifier.clone(),
        root.join("pages").join("loggedout.html"),
    )));
    let status: SharedHandler = Arc::new(DigestAuth::new(
        verifier,
        decorate(Arc::new(StatusJson::new(ctx))),
    ));

    let mut router = Router::new();
    router
        .get("/", MatchKind::Prefix, private)?
        .get("/assets", MatchKind::Prefix, public.clone())?
        .get("/pages", MatchKind::Prefix, public)?
        .get("/logout", MatchKind::Exact, logout)?
        .get("/status", MatchKind::Exact, status)?;
    Ok(router)
}
