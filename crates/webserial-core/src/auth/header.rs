//! `Authorization` header parsing.
//!
//! Accepts `Basic <token>` and `Digest k=v, k="v", ...`. Digest fields are
//! restricted to a fixed vocabulary; anything else is rejected rather than
//! ignored, so that a credential check never runs on a partial parse.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthError, HeaderError};

/// Digest field names understood by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Algorithm,
    Realm,
    Uri,
    Nonce,
    Nc,
    Cnonce,
    Qop,
    Response,
    Username,
    Opaque,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Algorithm,
        Field::Realm,
        Field::Uri,
        Field::Nonce,
        Field::Nc,
        Field::Cnonce,
        Field::Qop,
        Field::Response,
        Field::Username,
        Field::Opaque,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Algorithm => "algorithm",
            Field::Realm => "realm",
            Field::Uri => "uri",
            Field::Nonce => "nonce",
            Field::Nc => "nc",
            Field::Cnonce => "cnonce",
            Field::Qop => "qop",
            Field::Response => "response",
            Field::Username => "username",
            Field::Opaque => "opaque",
        }
    }
}

impl FromStr for Field {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| HeaderError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Basic,
    Digest,
}

/// Parsed `Authorization` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    scheme: Scheme,
    fields: BTreeMap<Field, String>,
    /// Raw credentials for the Basic scheme.
    token: Option<String>,
}

impl Authorization {
    pub fn parse(value: &str) -> Result<Self, HeaderError> {
        let value = value.trim_start();
        let (scheme, rest) = value.split_once(' ').ok_or(HeaderError::MissingScheme)?;

        if scheme.eq_ignore_ascii_case("basic") {
            return Ok(Self {
                scheme: Scheme::Basic,
                fields: BTreeMap::new(),
                token: Some(rest.trim().to_string()),
            });
        }
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(HeaderError::UnknownScheme(scheme.to_string()));
        }

        let mut fields = BTreeMap::new();
        for part in split_fields(rest) {
            let (key, raw) = part
                .split_once('=')
                .ok_or_else(|| HeaderError::MissingEquals(part.to_string()))?;
            let field: Field = key.trim().parse()?;
            fields.insert(field, unquote(raw.trim()));
        }

        Ok(Self {
            scheme: Scheme::Digest,
            fields,
            token: None,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Like [`get`](Self::get) but a missing field is an [`AuthError`].
    pub fn require(&self, field: Field) -> Result<&str, AuthError> {
        self.get(field).ok_or(AuthError::MissingField(field))
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Split on commas that are not inside a quoted string; empty parts are
/// dropped.
fn split_fields(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn unquote(raw: &str) -> String {
    match raw
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    out.extend(chars.next());
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSER_HEADER: &str = r#"Digest username="alice", realm="webserial", nonce="abc123", uri="/", response="0123456789abcdef0123456789abcdef""#;

    #[test]
    fn parses_browser_header() {
        let auth = Authorization::parse(BROWSER_HEADER).unwrap();
        assert_eq!(auth.scheme(), Scheme::Digest);
        assert_eq!(auth.get(Field::Username), Some("alice"));
        assert_eq!(auth.get(Field::Realm), Some("webserial"));
        assert_eq!(auth.get(Field::Uri), Some("/"));
        assert_eq!(auth.get(Field::Opaque), None);
    }

    #[test]
    fn unquoted_values_are_kept_whole() {
        let auth = Authorization::parse(r#"Digest qop=auth, nc=00000001, nonce="n""#).unwrap();
        assert_eq!(auth.get(Field::Qop), Some("auth"));
        assert_eq!(auth.get(Field::Nc), Some("00000001"));
    }

    #[test]
    fn comma_inside_quotes_is_not_a_separator() {
        let auth = Authorization::parse(r#"Digest uri="/a,b", nonce="n""#).unwrap();
        assert_eq!(auth.get(Field::Uri), Some("/a,b"));
    }

    #[test]
    fn escaped_quote_in_value() {
        let auth = Authorization::parse(r#"Digest username="a\"b""#).unwrap();
        assert_eq!(auth.get(Field::Username), Some("a\"b"));
    }

    #[test]
    fn missing_scheme() {
        assert_eq!(
            Authorization::parse("Digest"),
            Err(HeaderError::MissingScheme)
        );
    }

    #[test]
    fn unknown_scheme() {
        assert_eq!(
            Authorization::parse("Bearer abc"),
            Err(HeaderError::UnknownScheme("Bearer".into()))
        );
    }

    #[test]
    fn missing_equals() {
        assert_eq!(
            Authorization::parse(r#"Digest username="a", realm"#),
            Err(HeaderError::MissingEquals("realm".into()))
        );
    }

    #[test]
    fn unknown_field() {
        assert_eq!(
            Authorization::parse(r#"Digest username="a", colour="red""#),
            Err(HeaderError::UnknownField("colour".into()))
        );
    }

    #[test]
    fn basic_scheme_keeps_token() {
        let auth = Authorization::parse("Basic YWxpY2U6c2VjcmV0").unwrap();
        assert_eq!(auth.scheme(), Scheme::Basic);
        assert_eq!(auth.token(), Some("YWxpY2U6c2VjcmV0"));
    }

    #[test]
    fn require_reports_field() {
        let auth = Authorization::parse(r#"Digest username="a""#).unwrap();
        assert_eq!(
            auth.require(Field::Response),
            Err(AuthError::MissingField(Field::Response))
        );
    }

    #[test]
    fn field_names_case_insensitive() {
        assert_eq!("USERNAME".parse::<Field>(), Ok(Field::Username));
    }
}
