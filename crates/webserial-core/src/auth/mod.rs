//! HTTP Digest authentication primitives.

pub mod digest;
pub mod header;
pub mod passwd;

pub use digest::{DigestVerifier, challenge, digest_response, generate_nonce, ha1, md5_hex};
pub use header::{Authorization, Field, Scheme};
pub use passwd::PasswordStore;
