//! HTTP request pipeline: model types, handler trait, middleware and router.
//!
//! The transport (see [`crate::transport`]) converts wire requests into
//! [`Request`] and renders [`Response`] back; everything in here is
//! independent of the socket layer and unit-testable on its own.

mod files;
mod handler;
pub mod middleware;
mod request;
mod response;
mod router;
mod status;

pub use files::{Logout, ServeFiles, mime_type_for, resolve};
pub use handler::{FnHandler, Handler, SharedHandler, handler_fn};
pub use middleware::{DigestAuth, RequestLogger, ResponseHeaders, access_line};
pub use request::{Request, RequestMeta};
pub use response::{Body, Response};
pub use router::{MatchKind, RouteError, Router};
pub use status::StatusJson;
