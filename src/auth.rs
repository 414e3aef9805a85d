//! Credential gatekeeping for the MCP endpoint.
//!
//! [`GatekeeperLayer`] wraps the MCP routes. For each request the
//! [`Gatekeeper`] reaches exactly one [`AuthDecision`]: either
//! [`AuthDecision::Forward`] or a [`Rejection`]:
//!
//! 1. no `Authorization` header: [`Rejection::Unauthenticated`] (401)
//! 2. local scope verification enabled and failing:
//!    [`Rejection::InsufficientScope`] (403), before any network call
//! 3. otherwise one `GET` to the external validator, forwarding the
//!    `Authorization` header unchanged plus enricher headers:
//!    - 2xx: [`AuthDecision::Forward`], the inner service runs
//!    - other status, 3xx included: [`Rejection::External`], answered with
//!      that status
//!    - transport failure or timeout: [`Rejection::UpstreamUnavailable`] (502)
//!
//! There are no retries and redirects are not followed. The validator call is
//! part of the request future, so a dropped request cancels it.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{Router, routing::post};
//! use openapi_mcp_guard::auth::{ExternalValidator, Gatekeeper, GatekeeperLayer};
//! use openapi_mcp_guard::enricher::EnricherChain;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), openapi_mcp_guard::Error> {
//! let validator = ExternalValidator::new(
//!     "https://auth.example.com/validate".parse().unwrap(),
//!     Duration::from_secs(5),
//!     Duration::from_secs(5),
//!     EnricherChain::defaults(None),
//! )?;
//!
//! let app: Router = Router::new()
//!     .route("/mcp", post(|| async { "ok" }))
//!     .layer(GatekeeperLayer::new(Gatekeeper::new(validator)));
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, Uri};
use axum::response::Response;
use tower::Layer;
use tower_service::Service;
use url::Url;

use crate::config::GuardConfig;
use crate::credential::Credential;
use crate::enricher::{CallerContext, EnricherChain};
use crate::error::{Error, Result};
use crate::error_model::{ErrorModelWriter, json_response};
use crate::metrics::{AuthOutcome, MetricsSink, NoopMetrics};
use crate::oauth::challenge::ChallengeBuilder;
use crate::oauth::token::TokenScopeVerifier;

/// Response headers never relayed from the validator.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Prefix of paths that never require credentials.
const WELL_KNOWN_PREFIX: &str = "/.well-known/";

/// Failure to obtain an answer from the external validator.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("credential validation timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("could not connect to the credential validator")]
    Connect(#[source] reqwest::Error),

    #[error("credential validation request failed")]
    Request(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ValidatorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ValidatorError::Timeout(e)
        } else if e.is_connect() {
            ValidatorError::Connect(e)
        } else {
            ValidatorError::Request(e)
        }
    }
}

/// A non-2xx answer from the validator.
#[derive(Debug, Clone)]
pub struct ExternalRejection {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why a request is turned away.
#[derive(Debug)]
pub enum Rejection {
    Unauthenticated,
    InsufficientScope,
    /// The validator answered with a non-2xx status.
    External(ExternalRejection),
    UpstreamUnavailable(ValidatorError),
}

impl Rejection {
    pub fn outcome(&self) -> AuthOutcome {
        match self {
            Rejection::Unauthenticated => AuthOutcome::Unauthenticated,
            Rejection::InsufficientScope => AuthOutcome::InsufficientScope,
            Rejection::External(_) => AuthOutcome::Rejected,
            Rejection::UpstreamUnavailable(_) => AuthOutcome::UpstreamUnavailable,
        }
    }
}

/// Outcome of gatekeeping one request.
#[derive(Debug)]
pub enum AuthDecision {
    Forward(Credential),
    Reject(Rejection),
}

impl AuthDecision {
    pub fn outcome(&self) -> AuthOutcome {
        match self {
            AuthDecision::Forward(_) => AuthOutcome::Forwarded,
            AuthDecision::Reject(rejection) => rejection.outcome(),
        }
    }
}

impl From<Rejection> for AuthDecision {
    fn from(rejection: Rejection) -> Self {
        AuthDecision::Reject(rejection)
    }
}

/// HTTP client for the external validation endpoint.
#[derive(Debug, Clone)]
pub struct ExternalValidator {
    client: reqwest::Client,
    url: Url,
    enrichers: EnricherChain,
}

impl ExternalValidator {
    /// `read_timeout` bounds each read of the answer, not the whole exchange.
    /// Redirects are never followed: a 3xx is a rejection like any other
    /// non-2xx status.
    pub fn new(
        url: Url,
        connect_timeout: Duration,
        read_timeout: Duration,
        enrichers: EnricherChain,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            url,
            enrichers,
        })
    }

    /// Validator for `auth.auth_url` with the configured timeouts and the
    /// default enrichers.
    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        let auth = &config.auth;
        let url = auth
            .auth_url
            .clone()
            .ok_or_else(|| Error::config("auth.auth_url is required when auth is enabled"))?;
        Self::new(
            url,
            auth.connect_timeout,
            auth.read_timeout,
            EnricherChain::defaults(config.server.user_agent.as_deref()),
        )
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Ask the validator about `credential`.
    ///
    /// Returns `Ok(None)` on 2xx and the rejection otherwise.
    pub async fn validate(
        &self,
        credential: &Credential,
        caller: &CallerContext<'_>,
    ) -> std::result::Result<Option<ExternalRejection>, ValidatorError> {
        let mut headers = self.enrichers.enrich(caller);
        headers.insert(AUTHORIZATION, credential.header_value().clone());
        tracing::debug!(url = %self.url, "Forwarding Authorization header to validation endpoint");

        let response = self.client.get(self.url.clone()).headers(headers).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(None);
        }

        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Some(ExternalRejection {
            status,
            headers,
            body,
        }))
    }
}

/// Request-time decision maker and rejection renderer.
pub struct Gatekeeper {
    validator: ExternalValidator,
    verifier: Option<TokenScopeVerifier>,
    challenge: Option<ChallengeBuilder>,
    errors: ErrorModelWriter,
    override_external_response: bool,
    public_paths: Vec<String>,
    metrics: Arc<dyn MetricsSink>,
}

impl Gatekeeper {
    /// Gatekeeper that only consults `validator`.
    pub fn new(validator: ExternalValidator) -> Self {
        Self {
            validator,
            verifier: None,
            challenge: None,
            errors: ErrorModelWriter::default(),
            override_external_response: true,
            public_paths: Vec::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Check token scopes locally before calling the validator.
    pub fn with_scope_verifier(mut self, verifier: TokenScopeVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Attach `WWW-Authenticate` challenges to 401 and 403 answers.
    pub fn with_challenge(mut self, challenge: ChallengeBuilder) -> Self {
        self.challenge = Some(challenge);
        self
    }

    pub fn with_error_writer(mut self, errors: ErrorModelWriter) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace validator bodies with local error models (default `true`).
    pub fn override_external_response(mut self, enabled: bool) -> Self {
        self.override_external_response = enabled;
        self
    }

    /// Paths that bypass the gatekeeper, together with everything below them.
    pub fn public_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.public_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Whether `path` skips gatekeeping.
    pub fn is_exempt(&self, path: &str) -> bool {
        path.starts_with(WELL_KNOWN_PREFIX) || self.public_paths.iter().any(|p| covers(p, path))
    }

    /// Decide what happens to a request carrying `credential`.
    pub async fn decide(
        &self,
        credential: Option<Credential>,
        caller: &CallerContext<'_>,
    ) -> AuthDecision {
        let Some(credential) = credential else {
            return Rejection::Unauthenticated.into();
        };

        if let Some(verifier) = &self.verifier
            && !verifier.verify(credential.expose().unwrap_or_default())
        {
            return Rejection::InsufficientScope.into();
        }

        match self.validator.validate(&credential, caller).await {
            Ok(None) => AuthDecision::Forward(credential),
            Ok(Some(rejection)) => Rejection::External(rejection).into(),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to validate credentials");
                Rejection::UpstreamUnavailable(e).into()
            }
        }
    }

    /// Response for a rejected request.
    pub fn reject(&self, rejection: Rejection, headers: &HeaderMap, uri: &Uri) -> Response {
        match rejection {
            Rejection::Unauthenticated => {
                let mut response = self.error_response(StatusCode::UNAUTHORIZED);
                self.attach_challenge(&mut response, || {
                    self.challenge.as_ref().map(|c| c.unauthorized(headers, uri))
                });
                response
            }
            Rejection::InsufficientScope => {
                let mut response = self.error_response(StatusCode::FORBIDDEN);
                self.attach_challenge(&mut response, || {
                    self.challenge.as_ref().map(|c| c.insufficient_scope(headers, uri))
                });
                response
            }
            Rejection::External(rejection) => {
                let status = rejection.status;
                let mut response = if self.override_external_response {
                    self.error_response(status)
                } else {
                    relay(rejection)
                };
                if status == StatusCode::UNAUTHORIZED {
                    self.attach_challenge(&mut response, || {
                        self.challenge.as_ref().map(|c| c.unauthorized(headers, uri))
                    });
                }
                response
            }
            Rejection::UpstreamUnavailable(e) => self.errors.response(
                StatusCode::BAD_GATEWAY,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(&e),
            ),
        }
    }

    fn error_response(&self, status: StatusCode) -> Response {
        json_response(status, self.errors.write(status))
    }

    fn attach_challenge(&self, response: &mut Response, challenge: impl FnOnce() -> Option<String>) {
        let Some(challenge) = challenge() else {
            return;
        };
        match HeaderValue::from_str(&challenge) {
            Ok(value) => {
                response.headers_mut().insert(WWW_AUTHENTICATE, value);
            }
            Err(e) => tracing::warn!(error = %e, "Challenge is not a valid header value, omitted"),
        }
    }
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("validator", &self.validator)
            .field("verifier", &self.verifier)
            .field("challenge", &self.challenge)
            .field("override_external_response", &self.override_external_response)
            .field("public_paths", &self.public_paths)
            .finish_non_exhaustive()
    }
}

/// Whether public path `public` covers `path`: the path itself or anything
/// below it, never a sibling that merely shares the prefix.
fn covers(public: &str, path: &str) -> bool {
    let public = public.trim_end_matches('/');
    match path.strip_prefix(public) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// The validator's answer minus hop-by-hop headers.
fn relay(rejection: ExternalRejection) -> Response {
    let mut response = Response::new(Body::from(rejection.body));
    *response.status_mut() = rejection.status;
    for (name, value) in &rejection.headers {
        if name == CONTENT_LENGTH || HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}

/// Tower layer applying a [`Gatekeeper`].
#[derive(Clone)]
pub struct GatekeeperLayer {
    gatekeeper: Arc<Gatekeeper>,
}

impl GatekeeperLayer {
    pub fn new(gatekeeper: Gatekeeper) -> Self {
        Self {
            gatekeeper: Arc::new(gatekeeper),
        }
    }
}

impl<S> Layer<S> for GatekeeperLayer {
    type Service = GatekeeperService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatekeeperService {
            inner,
            gatekeeper: self.gatekeeper.clone(),
        }
    }
}

/// Service created by [`GatekeeperLayer`].
///
/// Forwarded requests reach the inner service with the [`Credential`] in
/// their extensions.
#[derive(Clone)]
pub struct GatekeeperService<S> {
    inner: S,
    gatekeeper: Arc<Gatekeeper>,
}

impl<S> Service<Request<Body>> for GatekeeperService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let gatekeeper = self.gatekeeper.clone();

        Box::pin(async move {
            if gatekeeper.is_exempt(req.uri().path()) {
                return inner.call(req).await;
            }

            let (mut parts, body) = req.into_parts();
            let credential = Credential::from_headers(&parts.headers);
            let decision = {
                let caller = CallerContext::from_parts(&parts.headers, &parts.uri, &parts.extensions);
                gatekeeper.decide(credential, &caller).await
            };

            let outcome = decision.outcome();
            tracing::debug!(path = %parts.uri.path(), outcome = outcome.as_str(), "Auth decision");
            gatekeeper.metrics.auth_decision(outcome);

            match decision {
                AuthDecision::Forward(credential) => {
                    parts.extensions.insert(credential);
                    inner.call(Request::from_parts(parts, body)).await
                }
                AuthDecision::Reject(rejection) => Ok(gatekeeper.reject(rejection, &parts.headers, &parts.uri)),
            }
        })
    }
}
