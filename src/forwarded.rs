//! Caller-visible origin resolution from proxy headers.
//!
//! Behind a reverse proxy the request URI only shows the internal address.
//! [`Origin::resolve`] rebuilds `scheme://host[:port]` as the client saw it
//! from `X-Forwarded-*` headers, falling back to `Host`, the request URI, and
//! finally a configured base URL.

use std::fmt;
use std::str::FromStr;

use axum::http::uri::Authority;
use axum::http::{HeaderMap, HeaderName, Uri, header};
use url::Url;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");

/// `scheme://host[:port]` as seen by the client. Default ports are omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Origin {
    /// Build an origin, dropping the port when it is the scheme's default.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        let scheme = scheme.into().to_ascii_lowercase();
        let port = port.filter(|p| Some(*p) != default_port(&scheme));
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Origin of a URL, if it has a host.
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        Some(Self::new(url.scheme(), host, url.port()))
    }

    /// Resolve the caller-visible origin of a request.
    ///
    /// Host: first `X-Forwarded-Host` entry, then `Host`, then the URI
    /// authority, then `fallback`. Scheme: first `X-Forwarded-Proto` entry,
    /// then the URI scheme, then `fallback`'s scheme, then `http`. Port:
    /// `X-Forwarded-Port`, else the port carried by the chosen host value.
    pub fn resolve(headers: &HeaderMap, uri: &Uri, fallback: Option<&Url>) -> Option<Self> {
        let fallback_origin = fallback.and_then(Self::from_url);

        let parse = |h: &str| Authority::from_str(h).ok();
        let authority = first_entry(headers, &X_FORWARDED_HOST)
            .and_then(parse)
            .or_else(|| first_entry(headers, &header::HOST).and_then(parse))
            .or_else(|| uri.authority().cloned());

        let scheme = first_entry(headers, &X_FORWARDED_PROTO)
            .map(str::to_string)
            .or_else(|| uri.scheme_str().map(str::to_string))
            .or_else(|| fallback_origin.as_ref().map(|o| o.scheme.clone()))
            .unwrap_or_else(|| "http".to_string());

        let forwarded_port = first_entry(headers, &X_FORWARDED_PORT).and_then(|p| p.parse().ok());

        match authority {
            Some(authority) => Some(Self::new(
                scheme,
                authority.host(),
                forwarded_port.or(authority.port_u16()),
            )),
            None => {
                let fallback_origin = fallback_origin?;
                let port = forwarded_port.or(fallback_origin.port);
                Some(Self::new(scheme, fallback_origin.host, port))
            }
        }
    }

    /// `host[:port]` part of the origin.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// First comma-separated entry of a header, trimmed. Blank values count as absent.
pub(crate) fn first_entry<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
