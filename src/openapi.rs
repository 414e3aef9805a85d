//! Typed view of an already-parsed OpenAPI document.
//!
//! Only the parts the gatekeeper reads are modelled: document info, servers,
//! operations with their security requirements and `x-` extensions, and the
//! security schemes declared under `components`. Everything else in the
//! document is ignored on deserialization.
//!
//! ```rust
//! use openapi_mcp_guard::openapi::OpenApi;
//!
//! let doc: OpenApi = serde_json::from_value(serde_json::json!({
//!     "openapi": "3.1.0",
//!     "info": { "title": "Pets", "version": "1.0.0" },
//!     "paths": {
//!         "/pets": { "get": { "operationId": "listPets", "security": [{ "oauth": ["pets:read"] }] } }
//!     },
//!     "components": {
//!         "securitySchemes": { "oauth": { "type": "oauth2" } }
//!     }
//! }))
//! .unwrap();
//!
//! assert_eq!(doc.operations().count(), 1);
//! ```

use axum::http::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A security requirement object: scheme name → required scope values.
///
/// An empty map means "no security needed" for the operation it is attached to.
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

/// Root of an OpenAPI document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenApi {
    #[serde(default)]
    pub info: Info,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,

    #[serde(default)]
    pub paths: IndexMap<String, PathItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,

    /// Global security requirements, applied to operations that declare none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
}

impl OpenApi {
    /// Iterate over every operation in path order, then method order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, Method, &Operation)> {
        self.paths
            .iter()
            .flat_map(|(path, item)| item.operations().map(move |(m, op)| (path.as_str(), m, op)))
    }

    /// Security schemes declared under `components.securitySchemes`.
    pub fn security_schemes(&self) -> impl Iterator<Item = (&str, &SecurityScheme)> {
        self.components
            .iter()
            .flat_map(|c| c.security_schemes.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
}

/// A server entry from the `servers` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Operations available on a single path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Operation>,
}

impl PathItem {
    /// Iterate over the operations defined on this path.
    pub fn operations(&self) -> impl Iterator<Item = (Method, &Operation)> {
        [
            (Method::GET, &self.get),
            (Method::PUT, &self.put),
            (Method::POST, &self.post),
            (Method::DELETE, &self.delete),
            (Method::OPTIONS, &self.options),
            (Method::HEAD, &self.head),
            (Method::PATCH, &self.patch),
            (Method::TRACE, &self.trace),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    }
}

/// A single API operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Operation-level security. `None` means "inherit the global requirement",
    /// `Some(vec![])` means "explicitly no requirement".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,

    /// Remaining fields, including `x-` extensions.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Operation {
    /// Look up a specification extension. Keys not starting with `x-` are never
    /// extensions and always return `None`.
    pub fn extension(&self, key: &str) -> Option<&serde_json::Value> {
        if !key.starts_with("x-") {
            return None;
        }
        self.extra.get(key)
    }
}

/// The `components` section (only security schemes are kept).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(default)]
    pub security_schemes: IndexMap<String, SecurityScheme>,
}

/// A named security scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub kind: SecuritySchemeType,
}

impl SecurityScheme {
    /// Create a scheme of the given type.
    pub fn new(kind: SecuritySchemeType) -> Self {
        Self { kind }
    }
}

/// Security scheme types defined by OpenAPI 3.x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecuritySchemeType {
    #[serde(rename = "apiKey")]
    ApiKey,
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "oauth2")]
    OAuth2,
    #[serde(rename = "openIdConnect")]
    OpenIdConnect,
    #[serde(rename = "mutualTLS")]
    MutualTls,
    #[serde(other)]
    Unknown,
}

impl SecuritySchemeType {
    /// OpenID Connect is built on top of OAuth2; both carry scopes.
    pub fn uses_scopes(self) -> bool {
        matches!(self, SecuritySchemeType::OAuth2 | SecuritySchemeType::OpenIdConnect)
    }
}
