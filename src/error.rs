//! Structured error types for HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,

    // Authentication errors
    NotAuthenticated,
    InvalidCredentials,

    // Not found errors
    NotFound,
    TaskNotFound,
    UserNotFound,

    // Conflict errors
    AlreadyExists,

    // Internal errors
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    /// HTTP status the code is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::InvalidCredentials => StatusCode::BAD_REQUEST,
            ErrorCode::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound | ErrorCode::TaskNotFound | ErrorCode::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Structured error returned by the API.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn not_authenticated() -> Self {
        Self::new(
            ErrorCode::NotAuthenticated,
            "Authentication credentials were not provided.",
        )
    }

    pub fn invalid_token(message: &str) -> Self {
        Self::new(ErrorCode::NotAuthenticated, message)
    }

    pub fn invalid_credentials() -> Self {
        Self::new(
            ErrorCode::InvalidCredentials,
            "Unable to log in with provided credentials.",
        )
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found", what))
    }

    pub fn task_not_found(task_id: i64) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn user_not_found(user_id: i64) -> Self {
        Self::new(
            ErrorCode::UserNotFound,
            format!("User not found: {}", user_id),
        )
    }

    pub fn already_exists(what: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("A {} with that name already exists: {}", what, value),
        )
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Try to downcast to ApiError first
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(db_err) => ApiError::database(db_err),
                Err(err) => ApiError::internal(err),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        if status.is_server_error() {
            tracing::error!(code = ?self.code, message = %self.message, "Request failed");
        } else {
            tracing::debug!(code = ?self.code, message = %self.message, "Request rejected");
        }
        (status, Json(self)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
