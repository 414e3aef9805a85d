//! Local token scope verification.
//!
//! [`TokenScopeVerifier`] reads the `scope` claim straight out of a bearer JWT
//! and compares it with the discovered scope set. The signature is not
//! checked here; the external validator owns that.

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use super::discovery::ScopeDiscovery;
use crate::credential::bearer_token;

/// The only claim the verifier looks at.
#[derive(Debug, Deserialize)]
struct ScopeClaims {
    #[serde(default)]
    scope: Option<Value>,
}

/// Validation settings for reading claims without checking anything.
fn insecure_validation() -> Validation {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Scopes carried by the bearer token in an `Authorization` header value.
///
/// Anything that is not a decodable JWT with a string `scope` claim yields an
/// empty set.
pub fn token_scopes(authorization: &str) -> HashSet<String> {
    let Some(token) = bearer_token(authorization) else {
        return HashSet::new();
    };

    let claims = match jsonwebtoken::decode::<ScopeClaims>(
        token,
        &DecodingKey::from_secret(&[]),
        &insecure_validation(),
    ) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::debug!(error = %e, "Bearer token could not be decoded, treating as scopeless");
            return HashSet::new();
        }
    };

    match claims.scope {
        Some(Value::String(scope)) => scope.split_whitespace().map(str::to_string).collect(),
        _ => HashSet::new(),
    }
}

/// Checks that a token holds every discovered scope.
#[derive(Debug, Clone)]
pub struct TokenScopeVerifier {
    discovery: Arc<ScopeDiscovery>,
}

impl TokenScopeVerifier {
    pub fn new(discovery: Arc<ScopeDiscovery>) -> Self {
        Self { discovery }
    }

    /// `true` iff the token's scopes are a superset of the discovered scopes.
    pub fn verify(&self, authorization: &str) -> bool {
        let required = self.discovery.get();
        let held = token_scopes(authorization);
        let ok = required.iter().all(|scope| held.contains(scope));
        if !ok {
            tracing::debug!(
                required = %required,
                held = held.len(),
                "Token is missing discovered scopes"
            );
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeDiscoveryConfig;
    use crate::oauth::minimal::ScopeAlgorithm;
    use crate::openapi::OpenApi;
    use crate::registry::OpenApiRegistry;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token(claims: Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"not-checked")).unwrap()
    }

    fn verifier(mandatory: &str) -> TokenScopeVerifier {
        let doc: OpenApi = serde_json::from_value(json!({
            "components": { "securitySchemes": { "oauth": { "type": "oauth2" } } },
            "paths": { "/pets": { "get": { "security": [{ "oauth": ["pets:read"] }] } } }
        }))
        .unwrap();
        let config = ScopeDiscoveryConfig {
            enabled: true,
            mandatory_scopes: mandatory.to_string(),
            calculate_minimal_scopes: ScopeAlgorithm::Greedy,
            ..Default::default()
        };
        let registry = Arc::new(OpenApiRegistry::with_document("test", doc));
        TokenScopeVerifier::new(Arc::new(ScopeDiscovery::new(registry, &config)))
    }

    #[test]
    fn test_token_scopes_reads_scope_claim() {
        let jwt = token(json!({ "sub": "alice", "scope": "a  b c" }));
        let scopes = token_scopes(&format!("Bearer {jwt}"));
        assert_eq!(scopes.len(), 3);
        assert!(scopes.contains("a") && scopes.contains("b") && scopes.contains("c"));
    }

    #[test]
    fn test_token_scopes_ignores_expiry_and_signature() {
        let jwt = token(json!({ "scope": "a", "exp": 1, "aud": "someone-else" }));
        assert!(token_scopes(&format!("bearer {jwt}")).contains("a"));

        let other_key = encode(
            &Header::default(),
            &json!({ "scope": "a" }),
            &EncodingKey::from_secret(b"another-secret"),
        )
        .unwrap();
        assert!(token_scopes(&format!("Bearer {other_key}")).contains("a"));
    }

    #[test]
    fn test_token_scopes_fail_closed() {
        assert!(token_scopes("Bearer not-a-jwt").is_empty());
        assert!(token_scopes("Basic dXNlcjpwYXNz").is_empty());
        assert!(token_scopes("").is_empty());
        let array_scope = token(json!({ "scope": ["a", "b"] }));
        assert!(token_scopes(&format!("Bearer {array_scope}")).is_empty());
        let no_scope = token(json!({ "sub": "alice" }));
        assert!(token_scopes(&format!("Bearer {no_scope}")).is_empty());
    }

    #[test]
    fn test_verify_superset_passes() {
        let v = verifier("openid");
        let jwt = token(json!({ "scope": "openid pets:read extra" }));
        assert!(v.verify(&format!("Bearer {jwt}")));
        let exact = token(json!({ "scope": "pets:read openid" }));
        assert!(v.verify(&format!("Bearer {exact}")));
    }

    #[test]
    fn test_verify_strict_subset_fails() {
        let v = verifier("openid");
        let jwt = token(json!({ "scope": "pets:read" }));
        assert!(!v.verify(&format!("Bearer {jwt}")));
        assert!(!v.verify("Bearer garbage"));
    }

    #[test]
    fn test_verify_with_nothing_discovered() {
        let registry = Arc::new(OpenApiRegistry::with_document("empty", OpenApi::default()));
        let discovery = ScopeDiscovery::new(registry, &ScopeDiscoveryConfig::default());
        let v = TokenScopeVerifier::new(Arc::new(discovery));
        assert!(v.verify("Bearer garbage"));
    }
}
