//! Protected Resource Metadata (RFC 9728 Section 3).
//!
//! Defines the document served at `/.well-known/oauth-protected-resource` so
//! OAuth clients can discover which authorization server protects the MCP
//! endpoint and which scopes to request.

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};
use serde::{Deserialize, Serialize};
use url::Url;

use super::discovery::ScopeDiscovery;
use crate::base_url::{BaseUrl, display};
use crate::config::GuardConfig;
use crate::forwarded::Origin;
use crate::registry::OpenApiRegistry;

/// Protected Resource Metadata per RFC 9728 Section 3.
///
/// # Example
///
/// ```rust
/// use openapi_mcp_guard::oauth::ProtectedResourceMetadata;
///
/// let metadata = ProtectedResourceMetadata::new("https://mcp.example.com/mcp")
///     .resource_name("Pets API")
///     .authorization_server("https://auth.example.com")
///     .scopes(["pets:read"]);
///
/// let json = serde_json::to_value(&metadata).unwrap();
/// assert_eq!(json["bearer_methods_supported"][0], "access_token");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// URL clients use to reach the MCP endpoint.
    pub resource: String,

    /// Human-readable name of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    /// Authorization servers that issue tokens for this resource.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<String>,

    #[serde(default = "default_bearer_methods")]
    pub bearer_methods_supported: Vec<String>,

    /// Omitted entirely when nothing was discovered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
}

fn default_bearer_methods() -> Vec<String> {
    vec!["access_token".to_string()]
}

impl ProtectedResourceMetadata {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_name: None,
            authorization_servers: Vec::new(),
            bearer_methods_supported: default_bearer_methods(),
            scopes_supported: Vec::new(),
        }
    }

    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    pub fn authorization_server(mut self, url: impl Into<String>) -> Self {
        self.authorization_servers.push(url.into());
        self
    }

    pub fn scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes_supported.extend(scopes.into_iter().map(Into::into));
        self
    }
}

/// Builds [`ProtectedResourceMetadata`] for incoming requests.
#[derive(Debug, Clone)]
pub struct ProtectedResource {
    mcp_endpoint: String,
    server_name: Option<String>,
    authorization_server: Url,
    registry: Arc<OpenApiRegistry>,
    base_url: BaseUrl,
    discovery: Option<Arc<ScopeDiscovery>>,
}

impl ProtectedResource {
    pub fn new(
        config: &GuardConfig,
        authorization_server: Url,
        registry: Arc<OpenApiRegistry>,
        base_url: BaseUrl,
    ) -> Self {
        Self {
            mcp_endpoint: config.server.mcp_endpoint.clone(),
            server_name: config.server.name.clone(),
            authorization_server,
            registry,
            base_url,
            discovery: None,
        }
    }

    /// Advertise the scopes of `discovery`.
    pub fn with_discovery(mut self, discovery: Arc<ScopeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// The metadata as seen by the caller of this request.
    pub fn metadata(&self, headers: &HeaderMap, uri: &Uri) -> ProtectedResourceMetadata {
        let resource = match Origin::resolve(headers, uri, self.base_url.current().as_ref()) {
            Some(origin) => format!("{origin}{}", self.mcp_endpoint),
            None => self.mcp_endpoint.clone(),
        };

        let mut metadata = ProtectedResourceMetadata::new(resource)
            .authorization_server(display(&self.authorization_server));

        let name = self
            .server_name
            .clone()
            .or_else(|| self.registry.document().map(|doc| doc.info.title.clone()))
            .filter(|name| !name.trim().is_empty());
        if let Some(name) = name {
            metadata = metadata.resource_name(name);
        }

        if let Some(discovery) = &self.discovery {
            metadata = metadata.scopes(discovery.get().iter());
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_url::ApiBaseUrlConfig;
    use crate::config::ScopeDiscoveryConfig;
    use crate::openapi::OpenApi;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn registry(scopes: &[&str]) -> Arc<OpenApiRegistry> {
        let doc: OpenApi = serde_json::from_value(json!({
            "info": { "title": "Pets API", "version": "1.0.0" },
            "servers": [{ "url": "https://api.example.com" }],
            "components": { "securitySchemes": { "oauth": { "type": "oauth2" } } },
            "paths": { "/pets": { "get": { "security": [{ "oauth": scopes }] } } }
        }))
        .unwrap();
        Arc::new(OpenApiRegistry::with_document("test", doc))
    }

    fn resource(config: &GuardConfig, registry: Arc<OpenApiRegistry>) -> ProtectedResource {
        ProtectedResource::new(
            config,
            Url::parse("https://auth.example.com").unwrap(),
            registry.clone(),
            BaseUrl::new(ApiBaseUrlConfig::Default, registry),
        )
    }

    fn forwarded() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-host", HeaderValue::from_static("mcp.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers
    }

    #[test]
    fn test_metadata_document() {
        let registry = registry(&["pets:read"]);
        let discovery = Arc::new(ScopeDiscovery::new(
            registry.clone(),
            &ScopeDiscoveryConfig::default(),
        ));
        let metadata = resource(&GuardConfig::default(), registry)
            .with_discovery(discovery)
            .metadata(&forwarded(), &Uri::from_static("/.well-known/oauth-protected-resource"));

        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            json!({
                "resource": "https://mcp.example.com/mcp",
                "resource_name": "Pets API",
                "authorization_servers": ["https://auth.example.com"],
                "bearer_methods_supported": ["access_token"],
                "scopes_supported": ["pets:read"]
            })
        );
    }

    #[test]
    fn test_scopes_omitted_when_empty() {
        let registry = registry(&[]);
        let discovery = Arc::new(ScopeDiscovery::new(
            registry.clone(),
            &ScopeDiscoveryConfig::default(),
        ));
        let metadata = resource(&GuardConfig::default(), registry)
            .with_discovery(discovery)
            .metadata(&forwarded(), &Uri::from_static("/"));
        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("scopes_supported").is_none());
    }

    #[test]
    fn test_configured_name_and_base_url_fallback() {
        let mut config = GuardConfig::default();
        config.server.name = Some("pets-mcp".to_string());
        config.server.mcp_endpoint = "/api/mcp".to_string();

        let metadata = resource(&config, registry(&["a"])).metadata(&HeaderMap::new(), &Uri::from_static("/"));
        assert_eq!(metadata.resource, "https://api.example.com/api/mcp");
        assert_eq!(metadata.resource_name.as_deref(), Some("pets-mcp"));
        assert!(metadata.scopes_supported.is_empty());
    }

    #[test]
    fn test_deserialization_defaults() {
        let metadata: ProtectedResourceMetadata =
            serde_json::from_value(json!({ "resource": "https://mcp.example.com" })).unwrap();
        assert_eq!(metadata, ProtectedResourceMetadata::new("https://mcp.example.com"));
    }
}
