//! Gateway error types.
//!
//! [`ApiError`] is the structured error every client-visible failure is
//! rendered as. Responses carrying errors encode them as a JSON array:
//!
//! ```text
//! [{"code":405,"description":"Retrieve operation not allowed on list","subject":"gateway","title":"Not allowed","data":null}]
//! ```

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject stamped on errors raised by the gateway itself.
pub const SUBJECT: &str = "gateway";

/// Status codes the gateway emits.
pub mod codes {
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const METHOD_NOT_ALLOWED: u16 = 405;
    pub const LOCKED: u16 = 423;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// A structured, client-visible error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Status code
    pub code: u16,
    /// Human readable explanation
    pub description: String,
    /// Component that raised the error
    pub subject: String,
    /// Short title, e.g. `Bad Request`
    pub title: String,
    /// Optional additional data
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new error raised by the gateway
    pub fn new(title: impl Into<String>, description: impl Into<String>, code: u16) -> Self {
        Self {
            code,
            description: description.into(),
            subject: SUBJECT.to_string(),
            title: title.into(),
            data: None,
        }
    }

    /// Attach additional data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Override the subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Malformed input
    pub fn bad_request(details: impl Into<String>) -> Self {
        Self::new("Bad Request", details, codes::BAD_REQUEST)
    }

    /// Authentication failure
    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::new("Unauthorized", details, codes::UNAUTHORIZED)
    }

    /// Authorization failure
    pub fn forbidden(details: impl Into<String>) -> Self {
        Self::new("Forbidden", details, codes::FORBIDDEN)
    }

    /// Unroutable path
    pub fn not_found() -> Self {
        Self::new(
            "Not Found",
            "Unable to find the requested resource",
            codes::NOT_FOUND,
        )
    }

    /// The relationship graph forbids the operation
    pub fn method_not_allowed(details: impl Into<String>) -> Self {
        Self::new("Not allowed", details, codes::METHOD_NOT_ALLOWED)
    }

    /// Write refused while the model is read-only
    pub fn locked() -> Self {
        Self::new(
            "Locked",
            "This api is currently in read only mode",
            codes::LOCKED,
        )
    }

    /// Rate limited
    pub fn too_many_requests() -> Self {
        Self::new(
            "Rate Limit",
            "You have exceeded your rate limit",
            codes::TOO_MANY_REQUESTS,
        )
    }

    /// Processor, serialization or collaborator fault
    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            "Internal Server Error",
            details,
            codes::INTERNAL_SERVER_ERROR,
        )
    }

    /// Health check failure
    pub fn service_unavailable(details: impl Into<String>) -> Self {
        Self::new(
            "Service Unavailable",
            details,
            codes::SERVICE_UNAVAILABLE,
        )
    }

    /// HTTP status for this error, falling back to 500 for codes that are not
    /// valid HTTP statuses.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error {} ({}): {}: {}",
            self.code, self.subject, self.title, self.description
        )
    }
}

impl std::error::Error for ApiError {}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Gateway-level errors (not client-visible)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Server socket error
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
