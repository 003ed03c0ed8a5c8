// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::exam::error::ExamError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., inactive exam, illegal state transition)
    Conflict(String),

    // 422 Unprocessable Entity (the exam definition itself is broken)
    Unprocessable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => {
                tracing::error!("Unprocessable exam definition: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Maps engine errors onto HTTP semantics.
/// Allows using `?` on `SessionManager` and store calls.
impl From<ExamError> for AppError {
    fn from(err: ExamError) -> Self {
        match err {
            ExamError::NotFound(_) => AppError::NotFound(err.to_string()),
            ExamError::InactiveExam(_) | ExamError::InvalidState { .. } => {
                AppError::Conflict(err.to_string())
            }
            ExamError::MalformedExam(_) => AppError::Unprocessable(err.to_string()),
            ExamError::Validation(_) => AppError::BadRequest(err.to_string()),
            ExamError::Storage(msg) => AppError::InternalServerError(msg),
        }
    }
}
