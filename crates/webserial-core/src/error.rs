//! Error types for webserial-core.

use thiserror::Error;

use crate::auth::Field;

/// Main error type for webserial operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port or session registry failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Credential check failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Password store could not be loaded.
    #[error("password file line {line}: {message}")]
    PasswordFile { line: usize, message: String },

    /// Serial device could not be opened or configured.
    #[error("serial error: {message}")]
    Serial { message: String },

    /// Socket read/write failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Invalid startup configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Returns true if this error only affects the current operation and the
    /// session can carry on.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Resource(_) | Error::Serial { .. })
    }

    /// Returns true if this error must terminate the session that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::ConnectionClosed | Error::Io(_)
        )
    }
}

/// Convenience result type for webserial operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Registry failures surfaced inline to an interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Bad value")]
    BadValue,
    #[error("Device for supplied ID not found")]
    DeviceNotFound,
    #[error("Device already exists")]
    DeviceExists,
    #[error("Device is in use")]
    DeviceInUse,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Invalid baud rate")]
    InvalidBaud,
}

/// Failures while parsing an `Authorization` header value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// No space separating the scheme from the fields.
    #[error("missing authorization scheme")]
    MissingScheme,
    #[error("unknown authorization scheme: {0}")]
    UnknownScheme(String),
    /// A field without `=`.
    #[error("field without '=': {0}")]
    MissingEquals(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
}

/// Reasons a request was refused by digest authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("malformed Authorization header: {0}")]
    Malformed(#[from] HeaderError),
    #[error("Authorization scheme is not Digest")]
    WrongScheme,
    #[error("missing field {0}")]
    MissingField(Field),
    #[error("unknown user")]
    UnknownUser,
    #[error("response mismatch")]
    Mismatch,
}

impl AuthError {
    /// Malformed headers are answered with 400 rather than a challenge.
    pub fn is_malformed(&self) -> bool {
        matches!(self, AuthError::Malformed(_))
    }
}
