//! API base URL resolution.
//!
//! The base URL is either configured explicitly, picked by index from the
//! document's `servers` list, or defaults to the first server.

use std::sync::Arc;

use url::Url;

use crate::openapi::OpenApi;
use crate::registry::OpenApiRegistry;

/// Errors raised while parsing or resolving the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BaseUrlError {
    #[error("Server index must be non-negative, got: {0}")]
    NegativeServerIndex(i64),

    #[error(
        "No servers defined in OpenAPI document. Either define servers in the document or configure an explicit api_base_url"
    )]
    NoServers,

    #[error(
        "Server index {index} is out of bounds. The document has {count} server(s) defined"
    )]
    ServerIndexOutOfRange { index: usize, count: usize },

    #[error("Server at index {index} has no URL defined")]
    MissingServerUrl { index: usize },

    #[error("Invalid URL: {url}: {reason}")]
    MalformedUrl { url: String, reason: String },
}

/// How the API base URL is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ApiBaseUrlConfig {
    /// Use this URL as-is.
    Explicit(Url),
    /// Use the `servers[index]` entry of the document.
    ServerIndex(usize),
    /// Use the first server of the document.
    #[default]
    Default,
}

impl ApiBaseUrlConfig {
    /// Parse a configuration value.
    ///
    /// Blank or missing values select [`Default`](Self::Default), integers
    /// select a server index and anything else must be an absolute URL.
    pub fn parse(value: Option<&str>) -> Result<Self, BaseUrlError> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self::Default);
        };

        if let Ok(index) = value.parse::<i64>() {
            return usize::try_from(index)
                .map(Self::ServerIndex)
                .map_err(|_| BaseUrlError::NegativeServerIndex(index));
        }

        parse_url(value).map(Self::Explicit)
    }

    /// Resolve the base URL against a document.
    pub fn resolve(&self, doc: &OpenApi) -> Result<Url, BaseUrlError> {
        match self {
            Self::Explicit(url) => Ok(url.clone()),
            Self::ServerIndex(index) => resolve_server(doc, *index),
            Self::Default => resolve_server(doc, 0),
        }
    }
}

/// Base URL resolved against the registry's current document.
#[derive(Debug, Clone)]
pub struct BaseUrl {
    config: ApiBaseUrlConfig,
    registry: Arc<OpenApiRegistry>,
}

impl BaseUrl {
    pub fn new(config: ApiBaseUrlConfig, registry: Arc<OpenApiRegistry>) -> Self {
        Self { config, registry }
    }

    /// The base URL right now, or `None` while it cannot be resolved.
    pub fn current(&self) -> Option<Url> {
        if let ApiBaseUrlConfig::Explicit(url) = &self.config {
            return Some(url.clone());
        }
        let doc = self.registry.document()?;
        match self.config.resolve(&doc) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, document = %self.registry.document_id(), "Could not resolve API base URL");
                None
            }
        }
    }
}

/// `url` as text, without the lone `/` path that bare origins get.
pub(crate) fn display(url: &Url) -> &str {
    let text = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        text.trim_end_matches('/')
    } else {
        text
    }
}

/// Append the absolute `path` to the path of `url`.
pub(crate) fn join_path(url: &Url, path: &str) -> String {
    format!("{}{path}", url.as_str().trim_end_matches('/'))
}

fn resolve_server(doc: &OpenApi, index: usize) -> Result<Url, BaseUrlError> {
    if doc.servers.is_empty() {
        return Err(BaseUrlError::NoServers);
    }
    let server = doc
        .servers
        .get(index)
        .ok_or(BaseUrlError::ServerIndexOutOfRange {
            index,
            count: doc.servers.len(),
        })?;
    if server.url.trim().is_empty() {
        return Err(BaseUrlError::MissingServerUrl { index });
    }
    parse_url(server.url.trim())
}

fn parse_url(value: &str) -> Result<Url, BaseUrlError> {
    Url::parse(value).map_err(|e| BaseUrlError::MalformedUrl {
        url: value.to_string(),
        reason: e.to_string(),
    })
}
