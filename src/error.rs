// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::database::StorageError;
use crate::validation::{FieldError, ValidationFailure};

pub const GENERIC_INTERNAL_MESSAGE: &str = "An error occurred while processing your request";

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Vec<FieldError>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),
    LimitExceeded(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::LimitExceeded(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::LimitExceeded(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                json!({
                    "error": true,
                    "message": message,
                    "code": self.error_code(),
                    "field_errors": field_errors
                })
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Vec<FieldError>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        ApiError::LimitExceeded(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::PayloadTooLarge(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    /// 500 carrying the underlying message. The app-level redaction layer
    /// swaps it for a generic one unless `api.expose_internal_errors` is on.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        let detail = err.to_string();
        tracing::error!("Internal error: {}", detail);
        ApiError::InternalServerError(detail)
    }

    /// Same error with any 500 detail replaced by the generic message
    pub fn redacted(self) -> Self {
        match self {
            ApiError::InternalServerError(_) => ApiError::internal_server_error(GENERIC_INTERNAL_MESSAGE),
            other => other,
        }
    }
}

// Convert other error types to ApiError
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionError(msg) => {
                tracing::error!("Storage connection error: {}", msg);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            StorageError::Sqlx(
                e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)),
            ) => {
                tracing::error!("Storage connection error: {}", e);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader => ApiError::unauthorized("missing header"),
            AuthError::InvalidFormat => ApiError::unauthorized("invalid format"),
            AuthError::InvalidToken(reason) => {
                tracing::debug!("Token rejected: {}", reason);
                ApiError::unauthorized("invalid token")
            }
            AuthError::UserNotFound => ApiError::not_found("user not found in database"),
            AuthError::Storage(e) => e.into(),
        }
    }
}

impl From<ValidationFailure> for ApiError {
    fn from(err: ValidationFailure) -> Self {
        match err {
            ValidationFailure::Invalid(field_errors) => {
                ApiError::validation_error("Request validation failed", field_errors)
            }
            ValidationFailure::Internal(msg) => ApiError::internal(format!("validation aborted: {}", msg)),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();
        // Kept on the response so outer layers can rewrite it
        response.extensions_mut().insert(self);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::RequestPart;

    #[test]
    fn auth_errors_map_to_http_statuses() {
        assert_eq!(ApiError::from(AuthError::MissingHeader).status_code(), 401);
        assert_eq!(ApiError::from(AuthError::InvalidFormat).message(), "invalid format");
        let not_found = ApiError::from(AuthError::UserNotFound);
        assert_eq!(not_found.status_code(), 404);
        assert_eq!(not_found.message(), "user not found in database");
    }

    #[test]
    fn validation_error_body_lists_every_field() {
        let err = ApiError::from(ValidationFailure::Invalid(vec![
            FieldError::new(RequestPart::Body, "title", "Required"),
            FieldError::new(RequestPart::Query, "limit", "Must be at most 100"),
        ]));
        assert_eq!(err.status_code(), 400);

        let body = err.to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"].as_array().unwrap().len(), 2);
        assert_eq!(body["field_errors"][1]["location"], "query");
    }

    #[test]
    fn internal_validation_failure_is_a_500() {
        let err = ApiError::from(ValidationFailure::Internal("transform panicked".into()));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn redaction_only_touches_internal_errors() {
        let err = ApiError::internal("Transaction aborted: injected failure");
        assert_eq!(err.message(), "Transaction aborted: injected failure");
        assert_eq!(err.redacted().message(), GENERIC_INTERNAL_MESSAGE);

        let not_found = ApiError::not_found("document not found");
        assert_eq!(not_found.clone().redacted(), not_found);
    }

    #[test]
    fn payload_too_large_is_a_413() {
        let err = ApiError::payload_too_large("Request body exceeds 64 bytes");
        assert_eq!(err.status_code(), 413);
        assert_eq!(err.to_json()["code"], "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn storage_connection_loss_is_a_503() {
        let err = ApiError::from(StorageError::ConnectionError("refused".into()));
        assert_eq!(err.status_code(), 503);
        let err = ApiError::from(StorageError::TransactionAborted("boom".into()));
        assert_eq!(err.status_code(), 500);
    }
}
