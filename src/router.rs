//! Router assembly.
//!
//! [`GuardRouter`] turns a [`GuardConfig`] and an [`OpenApiRegistry`] into
//! an axum [`Router`]: the caller's MCP routes behind the gatekeeper, plus the
//! well-known discovery routes when OAuth is enabled.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::post};
//! use openapi_mcp_guard::config::GuardConfig;
//! use openapi_mcp_guard::registry::OpenApiRegistry;
//! use openapi_mcp_guard::openapi::OpenApi;
//! use openapi_mcp_guard::router::GuardRouter;
//!
//! # async fn run(config: GuardConfig, document: OpenApi) -> Result<(), openapi_mcp_guard::BoxError> {
//! let registry = Arc::new(OpenApiRegistry::with_document("petstore.yaml", document));
//! let mcp = Router::new().route("/mcp", post(|| async { "ok" }));
//!
//! let guard = GuardRouter::new(config, registry).build(mcp)?;
//! let _reload = guard.spawn_live_reload();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, guard.router.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;

use crate::auth::{ExternalValidator, Gatekeeper, GatekeeperLayer};
use crate::base_url::BaseUrl;
use crate::config::GuardConfig;
use crate::error::Result;
use crate::error_model::ErrorModelWriter;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::oauth::challenge::ChallengeBuilder;
use crate::oauth::discovery::ScopeDiscovery;
use crate::oauth::token::TokenScopeVerifier;
use crate::oauth::well_known::WellKnown;
use crate::registry::OpenApiRegistry;
use crate::reload::{LiveReload, ReloadListener};

/// Builder for the guarded router.
pub struct GuardRouter {
    config: GuardConfig,
    registry: Arc<OpenApiRegistry>,
    errors: ErrorModelWriter,
    metrics: Arc<dyn MetricsSink>,
    listener: Option<Arc<dyn ReloadListener>>,
}

/// Output of [`GuardRouter::build`].
#[derive(Debug)]
pub struct Guard {
    /// MCP routes behind the gatekeeper, merged with the well-known routes.
    pub router: Router,
    /// The scope cache, when scope discovery is enabled.
    pub discovery: Option<Arc<ScopeDiscovery>>,
    /// The refresher, when live reload is enabled. Not started yet.
    pub live_reload: Option<Arc<LiveReload>>,
}

impl Guard {
    /// Start the live reload task, if configured.
    pub fn spawn_live_reload(&self) -> Option<JoinHandle<()>> {
        self.live_reload.clone().map(LiveReload::start)
    }
}

impl GuardRouter {
    pub fn new(config: GuardConfig, registry: Arc<OpenApiRegistry>) -> Self {
        Self {
            config,
            registry,
            errors: ErrorModelWriter::default(),
            metrics: Arc::new(NoopMetrics),
            listener: None,
        }
    }

    /// Use a custom error model for every locally generated error body.
    pub fn with_error_writer(mut self, errors: ErrorModelWriter) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Notify `listener` whenever live reload activates a new document.
    pub fn with_reload_listener(mut self, listener: Arc<dyn ReloadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Wire everything around `mcp`.
    ///
    /// Fails on invalid configuration or when an HTTP client cannot be built.
    pub fn build(self, mcp: Router) -> Result<Guard> {
        let config = &self.config;
        config.validate()?;

        let base_url = BaseUrl::new(config.server.api_base_url()?, self.registry.clone());

        let discovery = config.scope_discovery_enabled().then(|| {
            Arc::new(
                ScopeDiscovery::new(self.registry.clone(), &config.auth.oauth.scope_discovery)
                    .with_metrics(self.metrics.clone()),
            )
        });
        if let Some(discovery) = &discovery {
            discovery.reload();
        }

        let mut router = mcp;

        if config.auth.oauth.enabled {
            let mut well_known = WellKnown::new(config, self.registry.clone(), base_url.clone())?
                .with_error_writer(self.errors.clone());
            if let Some(discovery) = &discovery {
                well_known = well_known.with_discovery(discovery.clone());
            }
            router = router.merge(well_known.into_router());
        }

        if config.auth.enabled {
            let mut gatekeeper = Gatekeeper::new(ExternalValidator::from_config(config)?)
                .with_error_writer(self.errors.clone())
                .with_metrics(self.metrics.clone())
                .override_external_response(config.auth.override_external_response)
                .public_paths(config.auth.public_paths.iter().cloned());

            if config.auth.oauth.enabled {
                let mut challenge = ChallengeBuilder::new(config, base_url.clone());
                if let Some(discovery) = &discovery {
                    challenge = challenge.with_discovery(discovery.clone());
                }
                gatekeeper = gatekeeper.with_challenge(challenge);
            }

            if config.auth.oauth.scope_discovery.verify_token_scopes
                && let Some(discovery) = &discovery
            {
                gatekeeper = gatekeeper.with_scope_verifier(TokenScopeVerifier::new(discovery.clone()));
            }

            tracing::info!(
                auth_url = config.auth.auth_url.as_ref().map(|u| u.as_str()).unwrap_or_default(),
                public_paths = ?config.auth.public_paths,
                "Credential gatekeeper enabled"
            );
            // Wraps the fallback too: unknown paths answer 401, not 404.
            router = router.layer(GatekeeperLayer::new(gatekeeper));
        } else {
            tracing::warn!("Authentication is disabled, MCP routes are unprotected");
        }

        let live_reload = config.live_reload.enabled.then(|| {
            let mut reload = LiveReload::new(self.registry.clone(), config.live_reload.clone())
                .with_metrics(self.metrics.clone());
            if let Some(discovery) = &discovery {
                reload = reload.with_discovery(discovery.clone());
            }
            if let Some(listener) = &self.listener {
                reload = reload.with_listener(listener.clone());
            }
            Arc::new(reload)
        });

        Ok(Guard {
            router,
            discovery,
            live_reload,
        })
    }
}

impl std::fmt::Debug for GuardRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardRouter")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
