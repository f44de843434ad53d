// Error handling module for the delivery API
// Provides centralized error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::db::StoreError;

/// Main error type for the API
/// All handlers return Result<T, ApiError>
///
/// Domain errors (inventory, costing, orders, settings) are converted into
/// this type so every endpoint answers with the same JSON shape.
#[derive(Debug)]
pub enum ApiError {
    /// Validation errors from request validation
    /// Maps to HTTP 400 Bad Request
    ValidationError(validator::ValidationErrors),

    /// Malformed input that is not covered by a validator rule
    /// Maps to HTTP 400 Bad Request
    BadRequest(String),

    /// Resource not found by ID
    /// Maps to HTTP 404 Not Found
    NotFound { resource: String, id: String },

    /// State conflict (duplicate, concurrent update, deleting an active order)
    /// Maps to HTTP 409 Conflict
    Conflict { message: String },

    /// Business-rule violation reported as a structured failure
    /// Maps to HTTP 422 Unprocessable Entity
    BusinessRule {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Persistence errors
    /// Maps to HTTP 500 Internal Server Error
    /// Sensitive details are filtered from client responses
    StoreError(StoreError),

    /// Internal server errors
    /// Maps to HTTP 500 Internal Server Error
    InternalError(String),
}

/// Consistent error response structure
///
/// Provides both a machine-readable `error_code` and a human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR", "INSUFFICIENT_STOCK")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, shortage report)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(error_code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message,
            details,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.to_error_response())).into_response()
    }
}

impl ApiError {
    /// Convert ApiError to the ErrorResponse body
    ///
    /// Logging levels:
    /// - error!: store and internal errors (500-level)
    /// - warn!: conflicts and business-rule violations
    /// - debug!: expected client errors (validation, not found)
    fn to_error_response(&self) -> ErrorResponse {
        match self {
            ApiError::ValidationError(errors) => {
                debug!("Validation error: {:?}", errors);
                ErrorResponse::new(
                    "VALIDATION_ERROR",
                    "Request validation failed".to_string(),
                    Some(serde_json::to_value(errors).unwrap_or(serde_json::json!({}))),
                )
            }
            ApiError::BadRequest(message) => {
                debug!("Bad request: {}", message);
                ErrorResponse::new("BAD_REQUEST", message.clone(), None)
            }
            ApiError::NotFound { resource, id } => {
                debug!("Resource not found: {} with id {}", resource, id);
                ErrorResponse::new("NOT_FOUND", format!("{} with id {} not found", resource, id), None)
            }
            ApiError::Conflict { message } => {
                warn!("Conflict error: {}", message);
                ErrorResponse::new("CONFLICT", message.clone(), None)
            }
            ApiError::BusinessRule { code, message, details } => {
                warn!("Business rule violation {}: {}", code, message);
                ErrorResponse::new(code, message.clone(), details.clone())
            }
            ApiError::StoreError(store_error) => {
                error!("Store error: {:?}", store_error);
                ErrorResponse::new("DATABASE_ERROR", "A database error occurred".to_string(), None)
            }
            ApiError::InternalError(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                ErrorResponse::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::BusinessRule { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::StoreError(_) | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        ApiError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    pub fn business_rule(code: &str, message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        ApiError::BusinessRule {
            code: code.to_string(),
            message: message.into(),
            details,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::StoreError(error)
    }
}

/// Convert validator errors to ApiError
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors)
    }
}
