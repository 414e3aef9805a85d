//! Outbound request enrichment.
//!
//! Calls this crate makes on behalf of a client (credential validation, the
//! well-known passthrough) carry extra headers describing that client. Each
//! [`RequestEnricher`] adds one concern; an [`EnricherChain`] applies them in
//! ascending [`order`](RequestEnricher::order). A failing enricher is logged
//! and skipped without affecting the others.
//!
//! # Example
//!
//! ```rust
//! use axum::http::{HeaderMap, Uri};
//! use openapi_mcp_guard::enricher::{CallerContext, EnricherChain};
//!
//! let chain = EnricherChain::defaults(Some("guard/1.0"));
//! let uri: Uri = "/mcp".parse().unwrap();
//! let headers = HeaderMap::new();
//! let peer = "10.0.0.7:51234".parse().ok();
//!
//! let out = chain.enrich(&CallerContext::new(&headers, &uri, peer));
//! assert_eq!(out["x-forwarded-for"], "10.0.0.7");
//! assert_eq!(out["user-agent"], "guard/1.0");
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header::{InvalidHeaderValue, USER_AGENT};
use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap, HeaderValue, Uri};

use crate::forwarded::{Origin, X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PORT, X_FORWARDED_PROTO};

/// The inbound request an outbound call is made for.
#[derive(Debug, Clone, Copy)]
pub struct CallerContext<'a> {
    pub headers: &'a HeaderMap,
    pub uri: &'a Uri,
    /// Remote address of the connection, when the server exposes it.
    pub peer: Option<SocketAddr>,
}

impl<'a> CallerContext<'a> {
    pub fn new(headers: &'a HeaderMap, uri: &'a Uri, peer: Option<SocketAddr>) -> Self {
        Self { headers, uri, peer }
    }

    /// Context of an axum request; the peer comes from `ConnectInfo<SocketAddr>`.
    pub fn from_parts(headers: &'a HeaderMap, uri: &'a Uri, extensions: &Extensions) -> Self {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self::new(headers, uri, peer)
    }
}

/// Error raised by a single enricher.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("invalid value for header {header}: {source}")]
    InvalidHeader {
        header: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("{0}")]
    Other(String),
}

fn invalid(header: &'static str) -> impl FnOnce(InvalidHeaderValue) -> EnrichError {
    move |source| EnrichError::InvalidHeader { header, source }
}

/// Adds headers to an outbound request.
pub trait RequestEnricher: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Lower values run first.
    fn order(&self) -> i32 {
        i32::MAX
    }

    /// Add headers for `caller` to `headers`.
    fn enrich(&self, headers: &mut HeaderMap, caller: &CallerContext<'_>) -> Result<(), EnrichError>;
}

/// Ordered set of enrichers.
#[derive(Clone, Default)]
pub struct EnricherChain {
    enrichers: Vec<Arc<dyn RequestEnricher>>,
}

impl EnricherChain {
    /// Build a chain; enrichers are sorted by their order, ties keep insertion order.
    pub fn new(enrichers: impl IntoIterator<Item = Arc<dyn RequestEnricher>>) -> Self {
        let mut enrichers: Vec<_> = enrichers.into_iter().collect();
        enrichers.sort_by_key(|e| e.order());
        Self { enrichers }
    }

    /// `X-Forwarded-For`, `X-Forwarded-Host`, and (when set) `User-Agent`.
    pub fn defaults(user_agent: Option<&str>) -> Self {
        let mut enrichers: Vec<Arc<dyn RequestEnricher>> =
            vec![Arc::new(XForwardedForEnricher), Arc::new(XForwardedHostEnricher)];
        if let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
            enrichers.push(Arc::new(UserAgentEnricher::new(ua)));
        }
        Self::new(enrichers)
    }

    /// Add an enricher, keeping the chain ordered.
    pub fn with(mut self, enricher: impl RequestEnricher) -> Self {
        self.enrichers.push(Arc::new(enricher));
        self.enrichers.sort_by_key(|e| e.order());
        self
    }

    /// Names of the enrichers in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.enrichers.iter().map(|e| e.name()).collect()
    }

    /// Run every enricher and return the headers they produced.
    ///
    /// Each enricher works on a copy; a failure discards only its own changes.
    pub fn enrich(&self, caller: &CallerContext<'_>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for enricher in &self.enrichers {
            let mut scratch = headers.clone();
            tracing::debug!(enricher = enricher.name(), "Applying enricher");
            match enricher.enrich(&mut scratch, caller) {
                Ok(()) => headers = scratch,
                Err(e) => tracing::warn!(
                    enricher = enricher.name(),
                    error = %e,
                    "Enricher failed, continuing with remaining enrichers"
                ),
            }
        }
        headers
    }
}

impl std::fmt::Debug for EnricherChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnricherChain")
            .field("enrichers", &self.names())
            .finish()
    }
}

/// Appends the peer address to the `X-Forwarded-For` chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct XForwardedForEnricher;

impl XForwardedForEnricher {
    pub const ORDER: i32 = 100;

    /// Existing chain plus the peer IP, unless the chain already contains it.
    pub fn calculate(existing: Option<&str>, peer: Option<SocketAddr>) -> Option<String> {
        let peer_ip = peer.map(|p| p.ip().to_string());
        match existing.map(str::trim).filter(|x| !x.is_empty()) {
            Some(xff) => match peer_ip {
                Some(ip) if !xff.split(',').any(|entry| entry.trim() == ip) => Some(format!("{xff}, {ip}")),
                _ => Some(xff.to_string()),
            },
            None => peer_ip,
        }
    }
}

impl RequestEnricher for XForwardedForEnricher {
    fn name(&self) -> &str {
        "XForwardedForEnricher"
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn enrich(&self, headers: &mut HeaderMap, caller: &CallerContext<'_>) -> Result<(), EnrichError> {
        let existing = caller
            .headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok());
        if let Some(xff) = Self::calculate(existing, caller.peer) {
            let value = HeaderValue::try_from(xff.as_str()).map_err(invalid("x-forwarded-for"))?;
            tracing::debug!(x_forwarded_for = %xff, "Added X-Forwarded-For header");
            headers.insert(X_FORWARDED_FOR, value);
        }
        Ok(())
    }
}

/// Forwards the caller-visible host, scheme, and non-default port.
#[derive(Debug, Clone, Copy, Default)]
pub struct XForwardedHostEnricher;

impl XForwardedHostEnricher {
    pub const ORDER: i32 = 200;
}

impl RequestEnricher for XForwardedHostEnricher {
    fn name(&self) -> &str {
        "XForwardedHostEnricher"
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn enrich(&self, headers: &mut HeaderMap, caller: &CallerContext<'_>) -> Result<(), EnrichError> {
        let Some(origin) = Origin::resolve(caller.headers, caller.uri, None) else {
            tracing::trace!("No host available from request");
            return Ok(());
        };

        headers.insert(
            X_FORWARDED_HOST,
            HeaderValue::try_from(origin.host.as_str()).map_err(invalid("x-forwarded-host"))?,
        );
        headers.insert(
            X_FORWARDED_PROTO,
            HeaderValue::try_from(origin.scheme.as_str()).map_err(invalid("x-forwarded-proto"))?,
        );
        if let Some(port) = origin.port {
            headers.insert(X_FORWARDED_PORT, HeaderValue::from(port));
        }
        Ok(())
    }
}

/// Sets a fixed `User-Agent`.
#[derive(Debug, Clone)]
pub struct UserAgentEnricher {
    user_agent: String,
}

impl UserAgentEnricher {
    pub const ORDER: i32 = 1000;

    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl RequestEnricher for UserAgentEnricher {
    fn name(&self) -> &str {
        "UserAgentEnricher"
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn enrich(&self, headers: &mut HeaderMap, _caller: &CallerContext<'_>) -> Result<(), EnrichError> {
        if self.user_agent.trim().is_empty() {
            return Ok(());
        }
        let value = HeaderValue::try_from(self.user_agent.as_str()).map_err(invalid("user-agent"))?;
        headers.insert(USER_AGENT, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HOST;

    fn peer() -> Option<SocketAddr> {
        "192.168.1.20:40000".parse().ok()
    }

    #[test]
    fn test_context_from_parts() {
        let headers = HeaderMap::new();
        let uri: Uri = "/mcp".parse().unwrap();
        let mut extensions = Extensions::new();
        assert_eq!(CallerContext::from_parts(&headers, &uri, &extensions).peer, None);

        extensions.insert(ConnectInfo("192.168.1.20:40000".parse::<SocketAddr>().unwrap()));
        assert_eq!(CallerContext::from_parts(&headers, &uri, &extensions).peer, peer());
    }

    #[test]
    fn test_xff_calculation() {
        assert_eq!(XForwardedForEnricher::calculate(None, peer()).as_deref(), Some("192.168.1.20"));
        assert_eq!(
            XForwardedForEnricher::calculate(Some("203.0.113.5"), peer()).as_deref(),
            Some("203.0.113.5, 192.168.1.20")
        );
        assert_eq!(
            XForwardedForEnricher::calculate(Some("203.0.113.5, 192.168.1.20"), peer()).as_deref(),
            Some("203.0.113.5, 192.168.1.20")
        );
        assert_eq!(
            XForwardedForEnricher::calculate(Some("203.0.113.5"), None).as_deref(),
            Some("203.0.113.5")
        );
        assert_eq!(XForwardedForEnricher::calculate(Some("  "), None), None);
    }

    #[test]
    fn test_xff_compares_whole_entries() {
        let peer = Some("10.0.0.7:5000".parse().unwrap());
        assert_eq!(
            XForwardedForEnricher::calculate(Some("10.0.0.70"), peer).as_deref(),
            Some("10.0.0.70, 10.0.0.7")
        );
        assert_eq!(
            XForwardedForEnricher::calculate(Some("110.0.0.7 , 10.0.0.7"), peer).as_deref(),
            Some("110.0.0.7 , 10.0.0.7")
        );
    }

    #[test]
    fn test_forwarded_host_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("api.example.com:8080"));
        let uri: Uri = "/mcp".parse().unwrap();

        let out = EnricherChain::new([Arc::new(XForwardedHostEnricher) as Arc<dyn RequestEnricher>])
            .enrich(&CallerContext::new(&inbound, &uri, None));
        assert_eq!(out[X_FORWARDED_HOST], "api.example.com");
        assert_eq!(out[X_FORWARDED_PROTO], "http");
        assert_eq!(out[X_FORWARDED_PORT], "8080");
    }

    #[test]
    fn test_default_port_not_forwarded() {
        let mut inbound = HeaderMap::new();
        inbound.insert(X_FORWARDED_HOST, HeaderValue::from_static("api.example.com"));
        inbound.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
        let uri: Uri = "/mcp".parse().unwrap();

        let out = XForwardedHostEnricher;
        let mut headers = HeaderMap::new();
        out.enrich(&mut headers, &CallerContext::new(&inbound, &uri, None))
            .unwrap();
        assert_eq!(headers[X_FORWARDED_PROTO], "https");
        assert!(headers.get(X_FORWARDED_PORT).is_none());
    }

    struct Failing;

    impl RequestEnricher for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn order(&self) -> i32 {
            150
        }

        fn enrich(&self, headers: &mut HeaderMap, _: &CallerContext<'_>) -> Result<(), EnrichError> {
            headers.insert("x-partial", HeaderValue::from_static("leaked"));
            Err(EnrichError::Other("boom".to_string()))
        }
    }

    #[test]
    fn test_failing_enricher_is_skipped() {
        let chain = EnricherChain::defaults(Some("guard/1.0")).with(Failing);
        assert_eq!(
            chain.names(),
            ["XForwardedForEnricher", "Failing", "XForwardedHostEnricher", "UserAgentEnricher"]
        );

        let inbound = HeaderMap::new();
        let uri: Uri = "http://localhost:3000/mcp".parse().unwrap();
        let out = chain.enrich(&CallerContext::new(&inbound, &uri, peer()));

        assert!(out.get("x-partial").is_none());
        assert_eq!(out[X_FORWARDED_FOR], "192.168.1.20");
        assert_eq!(out[X_FORWARDED_HOST], "localhost");
        assert_eq!(out[USER_AGENT], "guard/1.0");
    }

    #[test]
    fn test_blank_user_agent_is_not_registered() {
        assert_eq!(
            EnricherChain::defaults(Some("   ")).names(),
            ["XForwardedForEnricher", "XForwardedHostEnricher"]
        );
    }
}
