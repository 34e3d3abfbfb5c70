use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared by every chat backend surface.
///
/// Each category fixes the HTTP status and the `error_type` reported to
/// clients. `Delivery` failures are isolated per push and never reach a client.
///
/// ```ignore
/// let response = ErrorCategory::Validation.to_response(
///     error_codes::MESSAGE_EMPTY,
///     "text is required",
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCategory {
    #[error("authentication failed")]
    Authentication,

    #[error("not permitted")]
    Authorization,

    #[error("invalid request")]
    Validation,

    #[error("dependency failure")]
    Dependency,

    #[error("delivery failure")]
    Delivery,
}

impl ErrorCategory {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::Authentication => 401,
            ErrorCategory::Authorization => 403,
            ErrorCategory::Validation => 400,
            ErrorCategory::Dependency | ErrorCategory::Delivery => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => error_types::AUTHENTICATION_ERROR,
            ErrorCategory::Authorization => error_types::AUTHORIZATION_ERROR,
            ErrorCategory::Validation => error_types::VALIDATION_ERROR,
            ErrorCategory::Dependency => error_types::DEPENDENCY_ERROR,
            ErrorCategory::Delivery => error_types::DELIVERY_ERROR,
        }
    }

    /// Short reason phrase used as the `error` field
    pub fn reason(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "Unauthorized",
            ErrorCategory::Authorization => "Forbidden",
            ErrorCategory::Validation => "Bad Request",
            ErrorCategory::Dependency | ErrorCategory::Delivery => "Internal Server Error",
        }
    }

    pub fn to_response(&self, code: &str, message: &str) -> ErrorResponse {
        ErrorResponse::new(
            self.reason(),
            message,
            self.status_code(),
            self.error_type(),
            code,
        )
    }
}

/// Structured error body returned by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP reason phrase
    pub error: String,

    /// Human-readable message; never carries internal detail for 5xx
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Taxonomy bucket, one of [`error_types`]
    pub error_type: String,

    /// Machine-readable code, one of [`error_codes`]
    pub code: String,

    /// Request correlation id, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

/// Standard error codes
pub mod error_codes {
    // Authentication
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const IDENTITY_MISSING: &str = "IDENTITY_MISSING";

    // Authorization
    pub const NOT_SYSTEM_CALLER: &str = "NOT_SYSTEM_CALLER";
    pub const NOT_CONVERSATION_MEMBER: &str = "NOT_CONVERSATION_MEMBER";

    // Validation
    pub const CONNECTION_ID_MISSING: &str = "CONNECTION_ID_MISSING";
    pub const PARTICIPANTS_INVALID: &str = "PARTICIPANTS_INVALID";
    pub const CONVERSATION_ID_MISSING: &str = "CONVERSATION_ID_MISSING";
    pub const MESSAGE_EMPTY: &str = "MESSAGE_EMPTY";
    pub const MESSAGE_TOO_LONG: &str = "MESSAGE_TOO_LONG";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    // Dependencies
    pub const STORE_ERROR: &str = "STORE_ERROR";
    pub const PUSH_GATEWAY_ERROR: &str = "PUSH_GATEWAY_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Standard error types
pub mod error_types {
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const DEPENDENCY_ERROR: &str = "dependency_error";
    pub const DELIVERY_ERROR: &str = "delivery_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Forbidden",
            "Not a participant of this conversation",
            403,
            error_types::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        );

        assert_eq!(error.status, 403);
        assert_eq!(error.error_type, error_types::AUTHORIZATION_ERROR);
        assert_eq!(error.code, error_codes::NOT_CONVERSATION_MEMBER);
    }

    #[test]
    fn test_category_statuses() {
        assert_eq!(ErrorCategory::Authentication.status_code(), 401);
        assert_eq!(ErrorCategory::Authorization.status_code(), 403);
        assert_eq!(ErrorCategory::Validation.status_code(), 400);
        assert_eq!(ErrorCategory::Dependency.status_code(), 500);
    }

    #[test]
    fn test_trace_id_is_omitted_when_absent() {
        let body = ErrorCategory::Validation.to_response(error_codes::MESSAGE_EMPTY, "text is required");
        let json = serde_json::to_value(&body).unwrap();

        assert!(json.get("trace_id").is_none());
        assert_eq!(json["error"], "Bad Request");

        let traced = body.with_trace_id("abc".into());
        assert_eq!(traced.trace_id.as_deref(), Some("abc"));
    }
}
