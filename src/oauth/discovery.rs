//! Scope discovery cache.
//!
//! [`ScopeDiscovery`] computes the scope set a client has to request from the
//! active OpenAPI document and caches it. The cached [`DiscoveredScopes`] is
//! replaced wholesale on [`reload`](ScopeDiscovery::reload); readers always
//! see either the previous or the new complete set.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::extract::ScopeExtractor;
use super::minimal::{ScopeAlgorithm, minimal_scopes};
use crate::config::ScopeDiscoveryConfig;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::openapi::OpenApi;
use crate::registry::OpenApiRegistry;

/// Immutable, sorted set of scopes required by the exposed operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredScopes(BTreeSet<String>);

impl DiscoveredScopes {
    pub fn new(scopes: BTreeSet<String>) -> Self {
        Self(scopes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.0
    }

    /// Space-delimited form used in `scope` parameters.
    pub fn to_scope_string(&self) -> String {
        self.iter().collect::<Vec<_>>().join(" ")
    }
}

impl<S: Into<String>> FromIterator<S> for DiscoveredScopes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for DiscoveredScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.iter().collect::<Vec<_>>().join(", "))
    }
}

/// Owner of the discovered scope set.
pub struct ScopeDiscovery {
    registry: Arc<OpenApiRegistry>,
    extractor: ScopeExtractor,
    algorithm: ScopeAlgorithm,
    mandatory: Vec<String>,
    current: ArcSwapOption<DiscoveredScopes>,
    metrics: Arc<dyn MetricsSink>,
}

impl ScopeDiscovery {
    /// Create a discovery cache over `registry`. Nothing is computed yet.
    pub fn new(registry: Arc<OpenApiRegistry>, config: &ScopeDiscoveryConfig) -> Self {
        Self {
            registry,
            extractor: ScopeExtractor::from_extension_key(config.extension_key()),
            algorithm: config.calculate_minimal_scopes,
            mandatory: config.mandatory_scopes().map(str::to_string).collect(),
            current: ArcSwapOption::empty(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report discovery results to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Compute the scope set of `doc` without touching the cache.
    pub fn discover(&self, doc: &OpenApi) -> DiscoveredScopes {
        let alternatives = self.extractor.extract(doc);
        let mut scopes = minimal_scopes(&alternatives, self.algorithm);
        scopes.extend(self.mandatory.iter().cloned());
        DiscoveredScopes(scopes)
    }

    /// The cached scopes, discovering them on first use.
    ///
    /// Returns an empty set while no document is loaded.
    pub fn get(&self) -> Arc<DiscoveredScopes> {
        if let Some(scopes) = self.current.load_full() {
            return scopes;
        }
        self.reload()
    }

    /// Recompute from the registry's current document and replace the cache.
    ///
    /// Without a document the cache is left untouched and an empty set is returned.
    pub fn reload(&self) -> Arc<DiscoveredScopes> {
        let Some(doc) = self.registry.document() else {
            tracing::debug!(document = %self.registry.document_id(), "No OpenAPI document loaded, scope discovery skipped");
            return Arc::new(DiscoveredScopes::default());
        };

        let scopes = Arc::new(self.discover(&doc));
        tracing::info!(scopes = %scopes, "Discovered scopes");
        self.metrics.scopes_discovered(scopes.len());
        self.current.store(Some(scopes.clone()));
        scopes
    }
}

impl fmt::Debug for ScopeDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeDiscovery")
            .field("extractor", &self.extractor)
            .field("algorithm", &self.algorithm)
            .field("mandatory", &self.mandatory)
            .field("current", &self.current.load_full())
            .finish()
    }
}
