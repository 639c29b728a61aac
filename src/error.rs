/// Unified error types for the access core
use crate::access::DenyReason;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for access-control operations
#[derive(Error, Debug)]
pub enum AccessError {
    /// Actor, target or hierarchy node does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input (unknown role string, missing anchor, oversized batch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A permission rule denied the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(DenyReason),

    /// The row changed underneath an optimistic update
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Underlying persistence failure
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Migration failure at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Missing or invalidated session
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccessError {
    /// Short reason used in per-item bulk results
    pub fn reason(&self) -> String {
        match self {
            AccessError::NotFound(_) => "not found".to_string(),
            AccessError::Validation(msg) => msg.clone(),
            AccessError::PermissionDenied(reason) => format!("no permission: {}", reason),
            AccessError::Conflict(_) => "conflict".to_string(),
            AccessError::Store(_) | AccessError::Migration(_) | AccessError::Io(_) => {
                "database error".to_string()
            }
            AccessError::Authentication(_) => "not authenticated".to_string(),
            AccessError::Internal(_) => "internal error".to_string(),
        }
    }
}

/// JSON error body returned to HTTP callers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AccessError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            AccessError::PermissionDenied(_) => {
                (StatusCode::FORBIDDEN, "PermissionDenied", self.to_string())
            }
            AccessError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            AccessError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            AccessError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            AccessError::Store(_)
            | AccessError::Migration(_)
            | AccessError::Io(_)
            | AccessError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for access-control operations
pub type AccessResult<T> = Result<T, AccessError>;
