//! Error handling module for the tutoring backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
#[allow(dead_code)]
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const SELF_BOOKING: &str = "SELF_BOOKING";
    pub const TAG_MISMATCH: &str = "TAG_MISMATCH";
    pub const SLOT_OVERLAP: &str = "SLOT_OVERLAP";
    pub const SLOT_UNAVAILABLE: &str = "SLOT_UNAVAILABLE";
    pub const ALREADY_STARTED: &str = "ALREADY_STARTED";
    pub const NOT_STARTED: &str = "NOT_STARTED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Authentication required
    Unauthorized(String),
    /// Resource not found
    NotFound(String),
    /// Malformed input
    Validation(String),
    /// A tutor cannot book a session with themselves
    SelfBooking(String),
    /// Requested subject is not offered by the tutor
    TagMismatch(String),
    /// New slot overlaps an existing active slot
    Overlap(String),
    /// The requested (tutor, day, time) is taken or outside availability
    SlotUnavailable(String),
    /// Booking was already started
    AlreadyStarted(String),
    /// Booking must be started before it can be concluded
    NotStarted(String),
    /// Messaging permission gate failure
    PermissionDenied(String),
    /// Storage failure, distinct from domain errors so callers may retry
    Database(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::SelfBooking(_) => StatusCode::BAD_REQUEST,
            AppError::TagMismatch(_) => StatusCode::BAD_REQUEST,
            AppError::Overlap(_) => StatusCode::CONFLICT,
            AppError::SlotUnavailable(_) => StatusCode::CONFLICT,
            AppError::AlreadyStarted(_) => StatusCode::CONFLICT,
            AppError::NotStarted(_) => StatusCode::CONFLICT,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::SelfBooking(_) => codes::SELF_BOOKING,
            AppError::TagMismatch(_) => codes::TAG_MISMATCH,
            AppError::Overlap(_) => codes::SLOT_OVERLAP,
            AppError::SlotUnavailable(_) => codes::SLOT_UNAVAILABLE,
            AppError::AlreadyStarted(_) => codes::ALREADY_STARTED,
            AppError::NotStarted(_) => codes::NOT_STARTED,
            AppError::PermissionDenied(_) => codes::PERMISSION_DENIED,
            AppError::Database(_) => codes::DATABASE_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::SelfBooking(msg)
            | AppError::TagMismatch(msg)
            | AppError::Overlap(msg)
            | AppError::SlotUnavailable(msg)
            | AppError::AlreadyStarted(msg)
            | AppError::NotStarted(msg)
            | AppError::PermissionDenied(msg)
            | AppError::Database(msg) => msg.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        (status, Json(body)).into_response()
    }
}
