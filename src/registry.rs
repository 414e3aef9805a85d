//! OpenAPI document registry.
//!
//! The [`OpenApiRegistry`] owns the currently active OpenAPI document and
//! swaps it atomically when a [`DocumentLoader`] produces a newer version.
//! Parsing and reference resolution live behind the loader; the registry only
//! sees the resulting object graph or an [`Error::InvalidDocument`].
//!
//! # Example
//!
//! ```rust
//! use openapi_mcp_guard::openapi::OpenApi;
//! use openapi_mcp_guard::registry::{OpenApiRegistry, ReloadOutcome, StaticDocumentLoader};
//!
//! # tokio_test_block(async {
//! let loader = StaticDocumentLoader::new("memory://pets", OpenApi::default());
//! let registry = OpenApiRegistry::new(loader);
//! assert!(registry.document().is_none());
//!
//! assert_eq!(registry.reload().await.unwrap(), ReloadOutcome::Loaded);
//! assert!(registry.document().is_some());
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::openapi::OpenApi;

/// Source of OpenAPI documents.
///
/// Implementations fetch, parse, filter, and resolve the document. Failures
/// should be reported as [`Error::InvalidDocument`] carrying the document
/// identifier and the underlying messages.
#[async_trait]
pub trait DocumentLoader: Send + Sync + 'static {
    /// Identifier of the document (URL, file path) used in logs and errors.
    fn document_id(&self) -> &str;

    /// Load the current version of the document.
    async fn load(&self) -> Result<OpenApi>;
}

/// Loader that always returns the same, already-parsed document.
#[derive(Debug, Clone)]
pub struct StaticDocumentLoader {
    id: String,
    document: OpenApi,
}

impl StaticDocumentLoader {
    /// Create a loader for an in-memory document.
    pub fn new(id: impl Into<String>, document: OpenApi) -> Self {
        Self {
            id: id.into(),
            document,
        }
    }
}

#[async_trait]
impl DocumentLoader for StaticDocumentLoader {
    fn document_id(&self) -> &str {
        &self.id
    }

    async fn load(&self) -> Result<OpenApi> {
        Ok(self.document.clone())
    }
}

/// What a call to [`OpenApiRegistry::reload`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// First successful load.
    Loaded,
    /// A document with a different `info.version` replaced the previous one.
    Updated,
    /// The loaded document has the same version as the current one; nothing changed.
    Unchanged,
}

/// Holder of the active OpenAPI document.
///
/// Readers get an `Arc` snapshot via [`document`](Self::document) and never
/// observe a partially replaced document.
pub struct OpenApiRegistry {
    loader: Arc<dyn DocumentLoader>,
    current: ArcSwapOption<OpenApi>,
}

impl OpenApiRegistry {
    /// Create an empty registry backed by the given loader.
    ///
    /// Nothing is loaded until [`reload`](Self::reload) is called.
    pub fn new(loader: impl DocumentLoader) -> Self {
        Self {
            loader: Arc::new(loader),
            current: ArcSwapOption::empty(),
        }
    }

    /// Create a registry that is already populated with `document`.
    pub fn with_document(id: impl Into<String>, document: OpenApi) -> Self {
        let registry = Self::new(StaticDocumentLoader::new(id, document.clone()));
        registry.current.store(Some(Arc::new(document)));
        registry
    }

    /// Identifier of the backing document.
    pub fn document_id(&self) -> &str {
        self.loader.document_id()
    }

    /// Snapshot of the current document, if one has been loaded.
    pub fn document(&self) -> Option<Arc<OpenApi>> {
        self.current.load_full()
    }

    /// Load the document again and swap it in when its version changed.
    ///
    /// On failure the previous document stays active.
    pub async fn reload(&self) -> Result<ReloadOutcome> {
        let id = self.loader.document_id();
        tracing::info!(document = %id, "Loading OpenAPI document");

        let loaded = match self.loader.load().await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(document = %id, error = %e, messages = ?e.messages(), "Failed to load OpenAPI document");
                return Err(e);
            }
        };

        let previous = self.current.load_full();
        if let Some(previous) = &previous
            && previous.info.version == loaded.info.version
        {
            tracing::info!(document = %id, version = %loaded.info.version, "No new OpenAPI version found, skipping reload");
            return Ok(ReloadOutcome::Unchanged);
        }

        tracing::info!(document = %id, version = %loaded.info.version, "Loaded OpenAPI document");
        self.current.store(Some(Arc::new(loaded)));
        Ok(if previous.is_some() {
            ReloadOutcome::Updated
        } else {
            ReloadOutcome::Loaded
        })
    }

    /// Load the document, failing if the loader reports no usable document.
    pub async fn load_required(&self) -> Result<Arc<OpenApi>> {
        self.reload().await?;
        self.document().ok_or_else(|| {
            Error::invalid_document(self.document_id(), ["document is not available"])
        })
    }
}

impl std::fmt::Debug for OpenApiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenApiRegistry")
            .field("document_id", &self.document_id())
            .field("loaded", &self.current.load().is_some())
            .finish()
    }
}
