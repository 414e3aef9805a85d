//! `WWW-Authenticate` challenge construction.
//!
//! Challenges follow RFC 6750 Section 3 with the `resource_metadata`
//! parameter from RFC 9728:
//!
//! ```text
//! Bearer resource_metadata="<url>"[, scope="<scopes>"][, error="insufficient_scope"]
//! ```
//!
//! Parameter order is fixed. `scope` is present only when scopes have been
//! discovered, `error` only on the insufficient-scope variant.
//!
//! ```rust
//! use openapi_mcp_guard::oauth::challenge::render;
//! use openapi_mcp_guard::oauth::discovery::DiscoveredScopes;
//!
//! let url = "https://mcp.example.com/.well-known/oauth-protected-resource";
//! let scopes: DiscoveredScopes = ["b", "a"].into_iter().collect();
//!
//! assert_eq!(
//!     render(url, Some(&scopes), true),
//!     "Bearer resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\", \
//!      scope=\"a b\", error=\"insufficient_scope\""
//! );
//! ```

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};

use super::discovery::{DiscoveredScopes, ScopeDiscovery};
use crate::base_url::{BaseUrl, join_path};
use crate::config::{GuardConfig, UrlSource};
use crate::forwarded::Origin;

/// Path of the protected resource metadata document.
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Render a bearer challenge.
pub fn render(
    resource_metadata: &str,
    scopes: Option<&DiscoveredScopes>,
    insufficient_scope: bool,
) -> String {
    let mut challenge = format!("Bearer resource_metadata=\"{resource_metadata}\"");
    if let Some(scopes) = scopes.filter(|s| !s.is_empty()) {
        challenge.push_str(&format!(", scope=\"{}\"", scopes.to_scope_string()));
    }
    if insufficient_scope {
        challenge.push_str(", error=\"insufficient_scope\"");
    }
    challenge
}

/// Builds challenges for the current request.
#[derive(Debug, Clone)]
pub struct ChallengeBuilder {
    url_source: UrlSource,
    include_mcp_endpoint: bool,
    mcp_endpoint: String,
    base_url: BaseUrl,
    discovery: Option<Arc<ScopeDiscovery>>,
}

impl ChallengeBuilder {
    pub fn new(config: &GuardConfig, base_url: BaseUrl) -> Self {
        let www = &config.auth.oauth.www_authenticate;
        Self {
            url_source: www.url_source,
            include_mcp_endpoint: www.include_mcp_endpoint,
            mcp_endpoint: config.server.mcp_endpoint.clone(),
            base_url,
            discovery: None,
        }
    }

    /// Advertise the scopes of `discovery` in every challenge.
    pub fn with_discovery(mut self, discovery: Arc<ScopeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Absolute URL of the protected resource metadata for this request.
    ///
    /// Falls back to the request's forwarded origin when the base URL cannot
    /// be resolved, and to the bare path when no origin is known at all.
    pub fn resource_metadata_url(&self, headers: &HeaderMap, uri: &Uri) -> String {
        let base = self.base_url.current();

        if self.url_source == UrlSource::ApiBaseUrl
            && let Some(base) = &base
        {
            return join_path(base, PROTECTED_RESOURCE_PATH);
        }

        let Some(origin) = Origin::resolve(headers, uri, base.as_ref()) else {
            tracing::debug!("No caller origin available, using relative resource metadata URL");
            return PROTECTED_RESOURCE_PATH.to_string();
        };

        let path = if self.url_source == UrlSource::XForwardedHost && self.include_mcp_endpoint {
            self.mcp_endpoint.trim_end_matches('/')
        } else {
            ""
        };
        format!("{origin}{path}{PROTECTED_RESOURCE_PATH}")
    }

    /// Challenge for a request without credentials or with rejected ones.
    pub fn unauthorized(&self, headers: &HeaderMap, uri: &Uri) -> String {
        self.build(headers, uri, false)
    }

    /// Challenge for a token that lacks discovered scopes.
    pub fn insufficient_scope(&self, headers: &HeaderMap, uri: &Uri) -> String {
        self.build(headers, uri, true)
    }

    fn build(&self, headers: &HeaderMap, uri: &Uri, insufficient_scope: bool) -> String {
        let url = self.resource_metadata_url(headers, uri);
        let scopes = self.discovery.as_ref().map(|d| d.get());
        render(&url, scopes.as_deref(), insufficient_scope)
    }
}
