//! HTTP Digest credential checks (RFC 2069 form, no `qop`).
//!
//! `response = MD5(HA1 ":" nonce ":" MD5(method ":" uri))`
//!
//! Nonces are random per challenge but are not tracked: any nonce the client
//! presents is accepted as long as the response matches it.

use md5::{Digest, Md5};
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::header::{Authorization, Field, Scheme};
use super::passwd::PasswordStore;
use crate::constants::NONCE_LEN;
use crate::error::AuthError;

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// `MD5(username:realm:password)`
pub fn ha1(username: &str, realm: &str, password: &str) -> String {
    md5_hex(format!("{username}:{realm}:{password}").as_bytes())
}

/// Expected client response for a request.
pub fn digest_response(ha1: &str, nonce: &str, method: &str, uri: &str) -> String {
    let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
    md5_hex(format!("{ha1}:{nonce}:{ha2}").as_bytes())
}

/// Fresh random nonce, hex encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `WWW-Authenticate` value for a 401.
pub fn challenge(realm: &str, nonce: &str) -> String {
    format!("Digest realm=\"{realm}\", nonce=\"{nonce}\"")
}

/// Validates `Authorization` headers against a password store for one realm.
#[derive(Debug, Clone)]
pub struct DigestVerifier {
    realm: String,
    store: PasswordStore,
}

impl DigestVerifier {
    pub fn new(realm: impl Into<String>, store: PasswordStore) -> Self {
        Self {
            realm: realm.into(),
            store,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// New challenge header value with a fresh nonce.
    pub fn challenge(&self) -> String {
        challenge(&self.realm, &generate_nonce())
    }

    /// Check a request's credentials and return the authenticated username.
    pub fn verify(&self, method: &str, header: Option<&str>) -> Result<String, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        let auth = Authorization::parse(header)?;
        if auth.scheme() != Scheme::Digest {
            return Err(AuthError::WrongScheme);
        }

        let username = auth.require(Field::Username)?;
        let realm = auth.require(Field::Realm)?;
        let uri = auth.require(Field::Uri)?;
        let nonce = auth.require(Field::Nonce)?;
        let response = auth.require(Field::Response)?;

        if realm != self.realm {
            debug!(realm, expected = %self.realm, "digest realm mismatch");
            return Err(AuthError::Mismatch);
        }
        let ha1 = self
            .store
            .lookup(realm, username)
            .ok_or(AuthError::UnknownUser)?;

        let expected = digest_response(ha1, nonce, method, uri);
        let supplied = response.to_ascii_lowercase();
        if bool::from(expected.as_bytes().ct_eq(supplied.as_bytes())) {
            Ok(username.to_string())
        } else {
            Err(AuthError::Mismatch)
        }
    }
}
