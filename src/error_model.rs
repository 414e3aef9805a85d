//! Error response bodies.
//!
//! An [`ErrorModelProvider`] maps a status code (and optionally the failure
//! that led to it) to a serializable model. [`ErrorModelWriter`] type-erases a
//! provider and renders its model as JSON, falling back to a fixed literal if
//! serialization fails, so a rejected request always gets an answer.
//!
//! ```rust
//! use axum::http::StatusCode;
//! use openapi_mcp_guard::error_model::ErrorModelWriter;
//!
//! let writer = ErrorModelWriter::default();
//! assert_eq!(
//!     writer.write(StatusCode::NOT_FOUND),
//!     r#"{"error":"Not Found","description":"The requested resource was not found."}"#
//! );
//! ```

use std::error::Error as StdError;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use serde::{Deserialize, Serialize};

/// Content type of every JSON body produced by this crate.
pub const JSON_UTF8: &str = "application/json;charset=UTF-8";

/// Body used when the configured model cannot be serialized.
pub const FALLBACK_BODY: &str =
    r#"{"error":"Internal Server Error","description":"An unexpected error occurred on the server."}"#;

/// The default `{ "error": ..., "description": ... }` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorModel {
    pub error: String,
    pub description: String,
}

impl ErrorModel {
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            description: description.into(),
        }
    }
}

/// Produces the error body for a status code.
pub trait ErrorModelProvider: Send + Sync + 'static {
    type Model: Serialize;

    /// Build the model for `status`. `cause` is set when the status stems from
    /// a local failure, such as an unreachable validator.
    fn provide(&self, status: StatusCode, cause: Option<&(dyn StdError + 'static)>) -> Self::Model;
}

/// Status table covering the responses the gatekeeper commonly produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorModelProvider;

impl ErrorModelProvider for DefaultErrorModelProvider {
    type Model = ErrorModel;

    fn provide(&self, status: StatusCode, _cause: Option<&(dyn StdError + 'static)>) -> ErrorModel {
        let (error, description) = match status {
            StatusCode::BAD_REQUEST => (
                "Bad Request",
                "Check the request syntax and parameters and try again.",
            ),
            StatusCode::UNAUTHORIZED => (
                "Unauthorized",
                "Authentication required. Please provide valid credentials.",
            ),
            StatusCode::FORBIDDEN => (
                "Forbidden",
                "Access denied. You don't have permission to access this resource.",
            ),
            StatusCode::NOT_FOUND => ("Not Found", "The requested resource was not found."),
            StatusCode::TOO_MANY_REQUESTS => (
                "Too Many Requests",
                "Request limit exceeded. Please try again later.",
            ),
            StatusCode::BAD_GATEWAY => (
                "Bad Gateway",
                "The server received an invalid response from an upstream server.",
            ),
            StatusCode::INTERNAL_SERVER_ERROR => (
                "Internal Server Error",
                "An unexpected error occurred on the server.",
            ),
            s if s.is_client_error() => {
                return ErrorModel::new(
                    reason(s),
                    "A client error occurred. Please check your request.",
                );
            }
            s if s.is_server_error() => {
                return ErrorModel::new(
                    reason(s),
                    "An unexpected server error occurred. Please try again later.",
                );
            }
            _ => ("Unexpected Server Response", "Please try again."),
        };
        ErrorModel::new(error, description)
    }
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

type RenderFn = dyn Fn(StatusCode, Option<&(dyn StdError + 'static)>) -> Result<String, serde_json::Error>
    + Send
    + Sync;

/// Renders error bodies with a type-erased [`ErrorModelProvider`].
#[derive(Clone)]
pub struct ErrorModelWriter {
    render: Arc<RenderFn>,
}

impl ErrorModelWriter {
    /// Wrap a provider.
    pub fn new<P: ErrorModelProvider>(provider: P) -> Self {
        Self {
            render: Arc::new(move |status, cause| {
                serde_json::to_string(&provider.provide(status, cause))
            }),
        }
    }

    /// JSON body for `status`.
    pub fn write(&self, status: StatusCode) -> String {
        self.write_with_cause(status, None)
    }

    /// JSON body for `status` with the failure that caused it.
    pub fn write_with_cause(
        &self,
        status: StatusCode,
        cause: Option<&(dyn StdError + 'static)>,
    ) -> String {
        match (self.render)(status, cause) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(status = %status, error = %e, "Error serializing error model, using default body");
                FALLBACK_BODY.to_string()
            }
        }
    }

    /// A full response: `response_status` with the body rendered for `model_status`.
    ///
    /// The two differ when the caller answers with one status but wants the
    /// body of another, as for an unreachable validator (502 with the 500 body).
    pub fn response(
        &self,
        response_status: StatusCode,
        model_status: StatusCode,
        cause: Option<&(dyn StdError + 'static)>,
    ) -> Response {
        json_response(response_status, self.write_with_cause(model_status, cause))
    }
}

impl Default for ErrorModelWriter {
    fn default() -> Self {
        Self::new(DefaultErrorModelProvider)
    }
}

impl std::fmt::Debug for ErrorModelWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorModelWriter").finish_non_exhaustive()
    }
}

/// Build a JSON response with the crate's content type.
pub(crate) fn json_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;

    fn model(status: u16) -> ErrorModel {
        DefaultErrorModelProvider.provide(StatusCode::from_u16(status).unwrap(), None)
    }

    #[test]
    fn test_mapped_statuses() {
        assert_eq!(model(401).error, "Unauthorized");
        assert_eq!(
            model(401).description,
            "Authentication required. Please provide valid credentials."
        );
        assert_eq!(model(403).error, "Forbidden");
        assert_eq!(model(429).error, "Too Many Requests");
        assert_eq!(model(502).error, "Bad Gateway");
        assert_eq!(model(500).error, "Internal Server Error");
    }

    #[test]
    fn test_unmapped_client_and_server_errors() {
        let teapot = model(418);
        assert_eq!(teapot.error, "I'm a teapot");
        assert_eq!(
            teapot.description,
            "A client error occurred. Please check your request."
        );

        let unavailable = model(503);
        assert_eq!(unavailable.error, "Service Unavailable");
        assert_eq!(
            unavailable.description,
            "An unexpected server error occurred. Please try again later."
        );

        let redirect = model(302);
        assert_eq!(redirect.error, "Unexpected Server Response");
        assert_eq!(redirect.description, "Please try again.");
    }

    #[test]
    fn test_fallback_body_matches_default_500() {
        let writer = ErrorModelWriter::default();
        assert_eq!(writer.write(StatusCode::INTERNAL_SERVER_ERROR), FALLBACK_BODY);
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot serialize"))
        }
    }

    struct BrokenProvider;

    impl ErrorModelProvider for BrokenProvider {
        type Model = Unserializable;

        fn provide(&self, _: StatusCode, _: Option<&(dyn StdError + 'static)>) -> Unserializable {
            Unserializable
        }
    }

    #[test]
    fn test_serialization_failure_uses_fallback() {
        let writer = ErrorModelWriter::new(BrokenProvider);
        assert_eq!(writer.write(StatusCode::UNAUTHORIZED), FALLBACK_BODY);
    }

    #[derive(Serialize)]
    struct CustomModel {
        code: u16,
        cause: Option<String>,
    }

    struct CustomProvider;

    impl ErrorModelProvider for CustomProvider {
        type Model = CustomModel;

        fn provide(&self, status: StatusCode, cause: Option<&(dyn StdError + 'static)>) -> CustomModel {
            CustomModel {
                code: status.as_u16(),
                cause: cause.map(|c| c.to_string()),
            }
        }
    }

    #[test]
    fn test_custom_provider_receives_cause() {
        let writer = ErrorModelWriter::new(CustomProvider);
        let cause = std::io::Error::other("connection reset");
        assert_eq!(
            writer.write_with_cause(StatusCode::BAD_GATEWAY, Some(&cause)),
            r#"{"code":502,"cause":"connection reset"}"#
        );
    }

    #[test]
    fn test_response_uses_separate_model_status() {
        let writer = ErrorModelWriter::default();
        let response = writer.response(StatusCode::BAD_GATEWAY, StatusCode::INTERNAL_SERVER_ERROR, None);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_UTF8
        );
    }
}
