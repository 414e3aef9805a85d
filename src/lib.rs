//! # openapi-mcp-guard
//!
//! OAuth 2.1 resource-server gatekeeping for MCP servers generated from an
//! OpenAPI document.
//!
//! The crate sits in front of an MCP endpoint served with
//! [axum](https://docs.rs/axum) and [Tower](https://docs.rs/tower):
//!
//! - Every MCP request carries an `Authorization` header that is validated by
//!   an external endpoint before the request is served
//! - Clients learn which authorization server to use and which scopes to ask
//!   for from `WWW-Authenticate` challenges and well-known metadata
//! - Those scopes are derived from the OpenAPI document itself, optionally
//!   reduced to a minimal covering set, and follow the document when it is
//!   reloaded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::post};
//! use openapi_mcp_guard::{BoxError, GuardConfig, GuardRouter, OpenApiRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let config: GuardConfig = serde_json::from_str(r#"{
//!         "auth": {
//!             "auth_url": "https://auth.example.com/validate",
//!             "oauth": {
//!                 "enabled": true,
//!                 "url": "https://login.example.com",
//!                 "scope_discovery": { "enabled": true, "calculate_minimal_scopes": "GREEDY" }
//!             }
//!         }
//!     }"#)?;
//!
//!     let document = serde_json::from_str(&std::fs::read_to_string("openapi.json")?)?;
//!     let registry = Arc::new(OpenApiRegistry::with_document("openapi.json", document));
//!
//!     let mcp = Router::new().route("/mcp", post(|| async { "mcp" }));
//!     let guard = GuardRouter::new(config, registry).build(mcp)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(
//!         listener,
//!         guard.router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Key Types
//!
//! ### Request path
//! - [`GuardRouter`] - Assembles the guarded axum router from a [`GuardConfig`]
//! - [`Gatekeeper`] / [`GatekeeperLayer`] - Credential check in front of the MCP routes
//! - [`ExternalValidator`] - The outbound validation call
//! - [`EnricherChain`] - Headers added to outbound calls (`X-Forwarded-*`, `User-Agent`)
//! - [`ErrorModelWriter`] - JSON bodies of locally generated errors
//!
//! ### OAuth discovery
//! - [`oauth::ScopeDiscovery`] - Cached scope set derived from the OpenAPI document
//! - [`oauth::ChallengeBuilder`] - `WWW-Authenticate` values
//! - [`oauth::WellKnown`] - Protected resource metadata and authorization server passthrough
//! - [`oauth::TokenScopeVerifier`] - Local check of a token's `scope` claim
//!
//! ### Document lifecycle
//! - [`OpenApiRegistry`] - Holds the active document
//! - [`LiveReload`] - Scheduled refresh with retries
//!
//! ## Logging and metrics
//!
//! Everything logs through [`tracing`]; no subscriber is installed. Metric
//! events go through a [`MetricsSink`]. [`RecorderMetrics`] forwards them to
//! the [`metrics`](https://docs.rs/metrics) facade.

pub mod auth;
pub mod base_url;
pub mod config;
pub mod credential;
pub mod enricher;
pub mod error;
pub mod error_model;
pub mod forwarded;
pub mod metrics;
pub mod oauth;
pub mod openapi;
pub mod registry;
pub mod reload;
pub mod router;

// Re-exports
pub use auth::{
    AuthDecision, ExternalValidator, Gatekeeper, GatekeeperLayer, GatekeeperService, Rejection,
    ValidatorError,
};
pub use base_url::{ApiBaseUrlConfig, BaseUrl, BaseUrlError};
pub use config::GuardConfig;
pub use credential::Credential;
pub use enricher::{CallerContext, EnricherChain, RequestEnricher};
pub use error::{BoxError, Error, Result};
pub use error_model::{ErrorModel, ErrorModelProvider, ErrorModelWriter};
pub use metrics::{MetricsSink, NoopMetrics, RecorderMetrics};
pub use openapi::OpenApi;
pub use registry::{DocumentLoader, OpenApiRegistry};
pub use reload::{LiveReload, ReloadListener};
pub use router::{Guard, GuardRouter};
