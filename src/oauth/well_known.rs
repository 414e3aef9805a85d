//! Well-known discovery endpoints.
//!
//! Serves the protected resource metadata locally and proxies the
//! authorization server's `oauth-authorization-server` and
//! `openid-configuration` documents. When scope discovery is active the
//! proxied `scopes_supported` is narrowed to the scopes this server needs.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{Extensions, HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use serde_json::{Map, Value};
use url::Url;

use super::challenge::PROTECTED_RESOURCE_PATH;
use super::discovery::{DiscoveredScopes, ScopeDiscovery};
use super::metadata::ProtectedResource;
use crate::base_url::{BaseUrl, join_path};
use crate::config::GuardConfig;
use crate::enricher::{CallerContext, EnricherChain, XForwardedForEnricher};
use crate::error::{Error, Result};
use crate::error_model::{ErrorModelWriter, json_response};
use crate::registry::OpenApiRegistry;

pub const OAUTH_AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";
pub const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// Handlers for the `/.well-known/` routes.
#[derive(Debug, Clone)]
pub struct WellKnown {
    client: reqwest::Client,
    authorization_server: Url,
    enrichers: EnricherChain,
    resource: ProtectedResource,
    discovery: Option<Arc<ScopeDiscovery>>,
    errors: ErrorModelWriter,
}

impl WellKnown {
    /// Build the endpoints from configuration. Requires `auth.oauth.url`.
    pub fn new(
        config: &GuardConfig,
        registry: Arc<OpenApiRegistry>,
        base_url: BaseUrl,
    ) -> Result<Self> {
        let oauth = &config.auth.oauth;
        let authorization_server = oauth
            .url
            .clone()
            .ok_or_else(|| Error::config("auth.oauth.url is required when OAuth is enabled"))?;

        let client = reqwest::Client::builder()
            .connect_timeout(oauth.connect_timeout)
            .read_timeout(oauth.read_timeout)
            .build()?;

        Ok(Self {
            client,
            resource: ProtectedResource::new(
                config,
                authorization_server.clone(),
                registry,
                base_url,
            ),
            authorization_server,
            enrichers: EnricherChain::default().with(XForwardedForEnricher),
            discovery: None,
            errors: ErrorModelWriter::default(),
        })
    }

    /// Narrow proxied scopes to, and advertise, the scopes of `discovery`.
    pub fn with_discovery(mut self, discovery: Arc<ScopeDiscovery>) -> Self {
        self.resource = self.resource.with_discovery(discovery.clone());
        self.discovery = Some(discovery);
        self
    }

    pub fn with_error_writer(mut self, errors: ErrorModelWriter) -> Self {
        self.errors = errors;
        self
    }

    /// Routes for all three documents.
    pub fn into_router(self) -> Router {
        Router::new()
            .route(PROTECTED_RESOURCE_PATH, get(protected_resource))
            .route(OAUTH_AUTHORIZATION_SERVER_PATH, get(authorization_server))
            .route(OPENID_CONFIGURATION_PATH, get(openid_configuration))
            .with_state(Arc::new(self))
    }

    /// Fetch `path` from the authorization server and adapt it.
    ///
    /// Any failure, including a non-2xx answer, becomes a 500 with the
    /// error model body.
    pub async fn proxy(&self, path: &str, caller: &CallerContext<'_>) -> Response {
        match self.fetch(path, caller).await {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Error proxying well-known endpoint");
                self.errors.response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some(&e),
                )
            }
        }
    }

    async fn fetch(&self, path: &str, caller: &CallerContext<'_>) -> Result<String> {
        let url = join_path(&self.authorization_server, path);
        tracing::debug!(url = %url, "Proxying well-known document");

        let body = self
            .client
            .get(&url)
            .headers(self.enrichers.enrich(caller))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        match &self.discovery {
            Some(discovery) => restrict_scopes(&body, &discovery.get()),
            None => Ok(body),
        }
    }
}

/// Replace `scopes_supported` in a JSON object with its intersection with
/// `discovered`, or with `discovered` when the field is absent.
fn restrict_scopes(body: &str, discovered: &DiscoveredScopes) -> Result<String> {
    let mut document: Map<String, Value> = serde_json::from_str(body)?;

    let scopes: Vec<Value> = match document.get("scopes_supported") {
        Some(Value::Array(upstream)) => upstream
            .iter()
            .filter_map(Value::as_str)
            .filter(|scope| discovered.contains(scope))
            .map(|scope| Value::String(scope.to_string()))
            .collect(),
        _ => discovered.iter().map(|scope| Value::String(scope.to_string())).collect(),
    };
    document.insert("scopes_supported".to_string(), Value::Array(scopes));

    Ok(serde_json::to_string(&document)?)
}

async fn protected_resource(
    State(state): State<Arc<WellKnown>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let metadata = state.resource.metadata(&headers, &uri);
    match serde_json::to_string(&metadata) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => state.errors.response(
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(&e),
        ),
    }
}

async fn authorization_server(
    State(state): State<Arc<WellKnown>>,
    headers: HeaderMap,
    uri: Uri,
    extensions: Extensions,
) -> Response {
    let caller = CallerContext::from_parts(&headers, &uri, &extensions);
    state.proxy(OAUTH_AUTHORIZATION_SERVER_PATH, &caller).await
}

async fn openid_configuration(
    State(state): State<Arc<WellKnown>>,
    headers: HeaderMap,
    uri: Uri,
    extensions: Extensions,
) -> Response {
    let caller = CallerContext::from_parts(&headers, &uri, &extensions);
    state.proxy(OPENID_CONFIGURATION_PATH, &caller).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scopes(items: &[&str]) -> DiscoveredScopes {
        items.iter().copied().collect()
    }

    fn restricted(body: Value, discovered: &[&str]) -> Value {
        let out = restrict_scopes(&body.to_string(), &scopes(discovered)).unwrap();
        serde_json::from_str(&out).unwrap()
    }

    #[test]
    fn test_scopes_are_intersected() {
        let out = restricted(
            json!({
                "issuer": "https://auth.example.com",
                "scopes_supported": ["openid", "pets:read", "admin", "pets:write"]
            }),
            &["pets:read", "pets:write", "unknown"],
        );
        assert_eq!(out["issuer"], "https://auth.example.com");
        assert_eq!(out["scopes_supported"], json!(["pets:read", "pets:write"]));
    }

    #[test]
    fn test_missing_scopes_use_discovered() {
        let out = restricted(json!({ "issuer": "x" }), &["b", "a"]);
        assert_eq!(out["scopes_supported"], json!(["a", "b"]));
    }

    #[test]
    fn test_non_object_is_an_error() {
        assert!(restrict_scopes("[1, 2]", &scopes(&["a"])).is_err());
        assert!(restrict_scopes("not json", &scopes(&["a"])).is_err());
    }

    #[test]
    fn test_requires_authorization_server() {
        let registry = Arc::new(OpenApiRegistry::with_document(
            "test",
            crate::openapi::OpenApi::default(),
        ));
        let base = BaseUrl::new(Default::default(), registry.clone());
        let err = WellKnown::new(&GuardConfig::default(), registry, base).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
