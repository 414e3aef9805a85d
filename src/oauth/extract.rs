//! Scope extraction from OpenAPI documents.
//!
//! Provides [`ScopeAlternative`], one acceptable combination of scopes for an
//! operation, and [`ScopeExtractor`], which collects the alternatives a
//! document declares. Two strategies exist:
//!
//! - **Extension**: operations list their scopes under a configured `x-`
//!   extension key, either as a single string or as a list.
//! - **Security schemes**: scopes come from `security` requirements that name
//!   an `oauth2` or `openIdConnect` scheme. Operations without their own
//!   `security` inherit the document-level requirement.

use std::collections::HashSet;

use serde_json::Value;

use crate::openapi::{OpenApi, SecurityRequirement};

/// One acceptable way of satisfying an operation: all of these scopes.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeAlternative(Vec<String>);

impl ScopeAlternative {
    /// Create an alternative, or `None` when `scopes` is empty.
    pub fn new(scopes: impl IntoIterator<Item = impl Into<String>>) -> Option<Self> {
        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        (!scopes.is_empty()).then_some(Self(scopes))
    }

    /// Scopes in declaration order.
    pub fn scopes(&self) -> &[String] {
        &self.0
    }

    /// Number of scopes (possibly with repeats).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Alternatives are never empty, so this is always `false`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Collects [`ScopeAlternative`]s from a document.
#[derive(Debug, Clone, Default)]
pub struct ScopeExtractor {
    extension_key: Option<String>,
}

impl ScopeExtractor {
    /// Extract from `security` requirements.
    pub fn security_schemes() -> Self {
        Self::default()
    }

    /// Extract from the given operation extension.
    pub fn extension(key: impl Into<String>) -> Self {
        Self {
            extension_key: Some(key.into()),
        }
    }

    /// Pick the strategy from an optional extension key; `None` selects security schemes.
    pub fn from_extension_key(key: Option<&str>) -> Self {
        match key {
            Some(key) => Self::extension(key),
            None => Self::security_schemes(),
        }
    }

    /// All alternatives declared by `doc`, in document order.
    pub fn extract(&self, doc: &OpenApi) -> Vec<ScopeAlternative> {
        match &self.extension_key {
            Some(key) => from_extensions(doc, key),
            None => from_security(doc),
        }
    }
}

fn from_extensions(doc: &OpenApi, key: &str) -> Vec<ScopeAlternative> {
    doc.operations()
        .filter_map(|(_, _, op)| op.extension(key))
        .filter_map(|value| match value {
            Value::String(scope) if !scope.trim().is_empty() => ScopeAlternative::new([scope.as_str()]),
            Value::Array(items) => ScopeAlternative::new(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
            ),
            _ => None,
        })
        .collect()
}

fn from_security(doc: &OpenApi) -> Vec<ScopeAlternative> {
    let scoped_schemes: HashSet<&str> = doc
        .security_schemes()
        .filter(|(_, scheme)| scheme.kind.uses_scopes())
        .map(|(name, _)| name)
        .collect();

    let mut alternatives = Vec::new();
    let mut global_used = false;
    for (_, _, op) in doc.operations() {
        match &op.security {
            Some(requirements) => alternatives.extend(from_requirements(&scoped_schemes, requirements)),
            None => global_used = true,
        }
    }

    if global_used && let Some(global) = &doc.security {
        alternatives.extend(from_requirements(&scoped_schemes, global));
    }
    alternatives
}

/// Alternatives of one requirement list.
///
/// An empty requirement object makes security optional for the whole list,
/// so the list then contributes nothing, including entries seen before it.
fn from_requirements(
    scoped_schemes: &HashSet<&str>,
    requirements: &[SecurityRequirement],
) -> Vec<ScopeAlternative> {
    let mut alternatives = Vec::new();
    for requirement in requirements {
        if requirement.is_empty() {
            return Vec::new();
        }
        alternatives.extend(
            requirement
                .iter()
                .filter(|(scheme, _)| scoped_schemes.contains(scheme.as_str()))
                .filter_map(|(_, scopes)| ScopeAlternative::new(scopes.iter().cloned())),
        );
    }
    alternatives
}
