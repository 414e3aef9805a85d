//! Error types for openapi-mcp-guard

use crate::base_url::BaseUrlError;

/// Boxed error type used at tower service boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// openapi-mcp-guard error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OpenAPI document could not be loaded, parsed, or resolved.
    ///
    /// Carries the document identifier (usually its URL or path) and the
    /// underlying messages reported by the loader.
    #[error("Invalid OpenAPI document {document}: {}", .messages.join("; "))]
    InvalidDocument {
        document: String,
        messages: Vec<String>,
    },

    #[error("API base URL error: {0}")]
    BaseUrl(#[from] BaseUrlError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an [`Error::InvalidDocument`] from a document identifier and its messages.
    pub fn invalid_document(
        document: impl Into<String>,
        messages: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Error::InvalidDocument {
            document: document.into(),
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an [`Error::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Detailed messages attached to this error, if any.
    pub fn messages(&self) -> &[String] {
        match self {
            Error::InvalidDocument { messages, .. } => messages,
            _ => &[],
        }
    }
}

/// Result type alias for openapi-mcp-guard
pub type Result<T> = std::result::Result<T, Error>;
