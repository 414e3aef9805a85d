//! Inbound credential handling.
//!
//! [`Credential`] wraps the raw `Authorization` header value so it can be
//! forwarded byte-for-byte while staying out of logs and debug output.
//!
//! ```rust
//! use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
//! use openapi_mcp_guard::credential::Credential;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
//!
//! let credential = Credential::from_headers(&headers).unwrap();
//! assert_eq!(format!("{:?}", credential), "[REDACTED]");
//! assert_eq!(credential.bearer_token(), Some("abc.def.ghi"));
//! ```

use std::fmt::{self, Debug, Display, Formatter};

use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};

const REDACTED: &str = "[REDACTED]";

/// The raw `Authorization` header value of a request.
///
/// Debug and Display output never show the value. The wrapped header is
/// marked sensitive so HTTP/2 encoders skip indexing it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: HeaderValue,
}

impl Credential {
    /// Wrap a header value.
    pub fn new(mut value: HeaderValue) -> Self {
        value.set_sensitive(true);
        Self { value }
    }

    /// Read the first `Authorization` header, if any.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers.get(AUTHORIZATION).cloned().map(Self::new)
    }

    /// The header value exactly as received.
    pub fn header_value(&self) -> &HeaderValue {
        &self.value
    }

    /// The header value as text, if it is valid visible ASCII.
    pub fn expose(&self) -> Option<&str> {
        self.value.to_str().ok()
    }

    /// The token after a case-insensitive `Bearer ` prefix, trimmed.
    pub fn bearer_token(&self) -> Option<&str> {
        bearer_token(self.expose()?)
    }
}

/// Strip a case-insensitive `Bearer ` prefix from an `Authorization` value.
///
/// Returns `None` when the scheme is not `Bearer` or the token is empty.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Display for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}
