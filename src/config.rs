//! Typed configuration surface.
//!
//! Every struct deserializes with serde and falls back to its documented
//! default for missing fields, so partial configuration files work. Durations
//! use human-readable strings (`"5s"`, `"10m"`).
//!
//! ```rust
//! use openapi_mcp_guard::config::{GuardConfig, UrlSource};
//!
//! let config: GuardConfig = serde_json::from_value(serde_json::json!({
//!     "auth": {
//!         "auth_url": "https://auth.example.com/validate",
//!         "read_timeout": "2s",
//!         "oauth": {
//!             "enabled": true,
//!             "url": "https://login.example.com",
//!             "www_authenticate": { "url_source": "X_FORWARDED_HOST" },
//!             "scope_discovery": { "enabled": true, "calculate_minimal_scopes": "GREEDY" }
//!         }
//!     }
//! }))
//! .unwrap();
//!
//! config.validate().unwrap();
//! assert_eq!(config.server.mcp_endpoint, "/mcp");
//! assert_eq!(config.auth.oauth.www_authenticate.url_source, UrlSource::XForwardedHost);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::base_url::{ApiBaseUrlConfig, BaseUrlError};
use crate::error::{Error, Result};
use crate::oauth::minimal::ScopeAlgorithm;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub live_reload: LiveReloadConfig,
}

impl GuardConfig {
    /// Check cross-field requirements that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.auth.enabled && self.auth.auth_url.is_none() {
            return Err(Error::config("auth.auth_url is required when auth is enabled"));
        }
        if self.auth.oauth.enabled && self.auth.oauth.url.is_none() {
            return Err(Error::config(
                "auth.oauth.url is required when OAuth is enabled",
            ));
        }
        if !self.server.mcp_endpoint.starts_with('/') {
            return Err(Error::config(format!(
                "server.mcp_endpoint must start with '/', got {:?}",
                self.server.mcp_endpoint
            )));
        }
        if self.live_reload.enabled && self.live_reload.max_retries == 0 {
            return Err(Error::config("live_reload.max_retries must be positive"));
        }
        self.server.api_base_url()?;
        Ok(())
    }

    /// Whether the scope discovery cache is in use.
    pub fn scope_discovery_enabled(&self) -> bool {
        self.auth.oauth.enabled && self.auth.oauth.scope_discovery.enabled
    }
}

/// Settings of the exposed MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Human-readable name; used as `resource_name`. Falls back to the document title.
    pub name: Option<String>,
    /// Path of the MCP endpoint.
    pub mcp_endpoint: String,
    /// Explicit URL, server index, or empty for the first document server.
    pub api_base_url: Option<String>,
    /// `User-Agent` sent on outbound calls. Blank means none.
    pub user_agent: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: None,
            mcp_endpoint: "/mcp".to_string(),
            api_base_url: None,
            user_agent: None,
        }
    }
}

impl ServerConfig {
    /// Parsed form of [`api_base_url`](Self::api_base_url).
    pub fn api_base_url(&self) -> std::result::Result<ApiBaseUrlConfig, BaseUrlError> {
        ApiBaseUrlConfig::parse(self.api_base_url.as_deref())
    }
}

/// Credential validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Endpoint the inbound credential is validated against.
    pub auth_url: Option<Url>,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Longest wait for each read from the validator. Not a cap on the whole call.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Replace the validator's non-2xx body with the local error model.
    pub override_external_response: bool,
    /// Paths served without credential checks, in addition to `/.well-known/`.
    pub public_paths: Vec<String>,
    pub oauth: OAuthConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth_url: None,
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            override_external_response: true,
            public_paths: Vec::new(),
            oauth: OAuthConfig::default(),
        }
    }
}

/// OAuth resource-server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub enabled: bool,
    /// Authorization server base URL.
    pub url: Option<Url>,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    pub www_authenticate: WwwAuthenticateConfig,
    pub scope_discovery: ScopeDiscoveryConfig,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            www_authenticate: WwwAuthenticateConfig::default(),
            scope_discovery: ScopeDiscoveryConfig::default(),
        }
    }
}

/// Where the `resource_metadata` URL of a challenge gets its origin from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrlSource {
    /// The resolved API base URL.
    #[default]
    ApiBaseUrl,
    /// `X-Forwarded-Host`, then `Host`, then the API base URL.
    XForwardedHost,
}

/// `WWW-Authenticate` rendering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WwwAuthenticateConfig {
    pub url_source: UrlSource,
    /// Append the MCP endpoint path before the well-known suffix.
    pub include_mcp_endpoint: bool,
}

/// Scope discovery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeDiscoveryConfig {
    pub enabled: bool,
    /// Operation extension holding scopes. Empty selects the security-scheme strategy.
    pub scope_extensions: String,
    /// Comma-separated scopes always included in the discovered set.
    pub mandatory_scopes: String,
    pub calculate_minimal_scopes: ScopeAlgorithm,
    /// Check the token's `scope` claim locally before calling the validator.
    pub verify_token_scopes: bool,
}

impl ScopeDiscoveryConfig {
    /// The configured extension key, if the extension strategy is selected.
    pub fn extension_key(&self) -> Option<&str> {
        Some(self.scope_extensions.trim()).filter(|k| !k.is_empty())
    }

    /// Mandatory scopes split on commas, trimmed, blanks dropped.
    pub fn mandatory_scopes(&self) -> impl Iterator<Item = &str> {
        self.mandatory_scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Scheduled document refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Attempts per scheduled run; stops at the first success.
    pub max_retries: u32,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(600),
            max_retries: 3,
        }
    }
}
