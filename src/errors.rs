use crate::services::PipelineError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Translate pipeline errors into stable, non-leaking HTTP responses.
/// Internal failure details are logged here and never echoed to callers.
impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            PipelineError::HotelNotFound(_) | PipelineError::ObjectNotFound(_) => {
                Self::not_found(err.to_string())
            }
            PipelineError::UnparseableResponse => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            PipelineError::Fetch { url, reason } => {
                tracing::error!(url = %url, reason = %reason, "source fetch failed");
                Self::new(StatusCode::BAD_GATEWAY, "upstream image fetch failed")
            }
            PipelineError::RenameUnsupported => {
                Self::internal("storage operation failed")
            }
            PipelineError::Sqlx(err) => {
                tracing::error!("database error: {}", err);
                Self::internal("metadata store operation failed")
            }
            PipelineError::Io(err) => {
                tracing::error!("storage i/o error: {}", err);
                Self::internal("storage operation failed")
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
