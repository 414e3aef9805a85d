//! OAuth 2.1 resource server support for MCP.
//!
//! The guarded MCP server acts as a **resource server**: tokens are issued by
//! an external authorization server and validated by an external endpoint.
//! This module adds the discovery side on top.
//!
//! # Architecture
//!
//! - **Scope discovery** ([`ScopeExtractor`], [`minimal_scopes`],
//!   [`ScopeDiscovery`]): derives the scopes a client must request from the
//!   active OpenAPI document, optionally reduced by greedy set cover.
//!
//! - **Challenges** ([`ChallengeBuilder`]): `WWW-Authenticate` values for 401
//!   and 403 responses, pointing at the protected resource metadata (RFC 9728).
//!
//! - **Local scope check** ([`TokenScopeVerifier`]): rejects tokens whose
//!   `scope` claim misses a discovered scope before the validator is called.
//!
//! - **Well-known routes** ([`WellKnown`]): the protected resource metadata
//!   document plus passthrough of the authorization server's metadata.
//!
//! # Discovery Flow
//!
//! 1. Client requests MCP endpoint without a token
//! 2. Server returns `401` with `WWW-Authenticate: Bearer resource_metadata="..."`
//! 3. Client fetches `/.well-known/oauth-protected-resource` to discover auth server
//! 4. Client obtains token from the authorization server
//! 5. Client retries with `Authorization: Bearer <token>`

pub mod challenge;
pub mod discovery;
pub mod extract;
pub mod metadata;
pub mod minimal;
pub mod token;
pub mod well_known;

// Re-exports
pub use challenge::ChallengeBuilder;
pub use discovery::{DiscoveredScopes, ScopeDiscovery};
pub use extract::{ScopeAlternative, ScopeExtractor};
pub use metadata::{ProtectedResource, ProtectedResourceMetadata};
pub use minimal::{ScopeAlgorithm, minimal_scopes};
pub use token::{TokenScopeVerifier, token_scopes};
pub use well_known::WellKnown;
