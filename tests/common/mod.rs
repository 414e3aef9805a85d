//! Shared fixtures: a mock authorization server and a served guard.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use openapi_mcp_guard::config::UrlSource;
use openapi_mcp_guard::credential::Credential;
use openapi_mcp_guard::{GuardConfig, GuardRouter, OpenApi, OpenApiRegistry};
use serde_json::json;

/// Headers of every call the mock validator received.
#[derive(Debug, Clone, Default)]
pub struct Seen(Arc<Mutex<Vec<HeaderMap>>>);

impl Seen {
    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn last(&self) -> HeaderMap {
        self.0.lock().unwrap().last().cloned().expect("validator was not called")
    }
}

/// Validator behaviour keyed by the bearer token:
///
/// - `forbidden`: 403 with a JSON body and an `x-upstream` header
/// - `expired`: 401 with its own `WWW-Authenticate`
/// - `slow`: 200 after two seconds
/// - `redirect`: 302 to `/login`, which itself answers 200
/// - anything else: 200
async fn validate(State(seen): State<Seen>, headers: HeaderMap) -> impl IntoResponse {
    seen.0.lock().unwrap().push(headers.clone());
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    match token.as_str() {
        "Bearer forbidden" => (
            StatusCode::FORBIDDEN,
            [("x-upstream", "denied")],
            r#"{"upstream":"denied"}"#,
        )
            .into_response(),
        "Bearer expired" => (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"upstream\"")],
            "expired",
        )
            .into_response(),
        "Bearer redirect" => (StatusCode::FOUND, [(header::LOCATION, "/login")]).into_response(),
        "Bearer slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            StatusCode::OK.into_response()
        }
        _ => StatusCode::OK.into_response(),
    }
}

/// Start the mock authorization server; returns its base URL and call log.
pub async fn start_auth_server() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/validate", get(validate))
        .route("/login", get(|| async { "login page" }))
        .route(
            "/.well-known/oauth-authorization-server",
            get(|| async {
                axum::Json(json!({
                    "issuer": "https://login.example.com",
                    "token_endpoint": "https://login.example.com/token",
                    "scopes_supported": ["openid", "pets:read", "admin"]
                }))
            }),
        )
        .route(
            "/.well-known/openid-configuration",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        )
        .with_state(seen.clone());

    (serve(app).await, seen)
}

/// OpenAPI document with one read and one write operation.
pub fn petstore() -> OpenApi {
    serde_json::from_value(json!({
        "openapi": "3.0.3",
        "info": { "title": "Pets", "version": "1.0.0" },
        "servers": [{ "url": "https://api.example.com" }],
        "components": {
            "securitySchemes": {
                "oauth": { "type": "oauth2" }
            }
        },
        "paths": {
            "/pets": {
                "get": { "security": [{ "oauth": ["pets:read"] }] },
                "post": { "security": [{ "oauth": ["pets:write"] }] }
            }
        }
    }))
    .unwrap()
}

/// Configuration pointing at the mock server, with OAuth and discovery on.
pub fn guard_config(auth_server: &str) -> GuardConfig {
    let mut config = GuardConfig::default();
    config.server.user_agent = Some("guard-test".to_string());
    config.auth.auth_url = Some(format!("{auth_server}/validate").parse().unwrap());
    config.auth.read_timeout = Duration::from_millis(300);
    config.auth.public_paths = vec!["/health".to_string()];
    config.auth.oauth.enabled = true;
    config.auth.oauth.url = Some(auth_server.parse().unwrap());
    config.auth.oauth.www_authenticate.url_source = UrlSource::XForwardedHost;
    config.auth.oauth.scope_discovery.enabled = true;
    config
}

/// MCP routes echoing the forwarded credential.
fn mcp() -> Router {
    Router::new()
        .route(
            "/mcp",
            post(|Extension(credential): Extension<Credential>| async move {
                credential.expose().unwrap_or_default().to_string()
            }),
        )
        .route("/health", get(|| async { "up" }))
}

/// Build and serve the guard; returns its base URL.
pub async fn start_guard(config: GuardConfig) -> String {
    let registry = Arc::new(OpenApiRegistry::with_document("petstore", petstore()));
    let guard = GuardRouter::new(config, registry).build(mcp()).unwrap();
    serve(guard.router).await
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}
