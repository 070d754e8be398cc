use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::catalog::client::CatalogError;
use crate::reminders::store::ReminderError;
use crate::storage::StorageError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid reminder time: {0}")]
    InvalidReminderTime(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ReminderError> for AppError {
    fn from(err: ReminderError) -> Self {
        match err {
            e @ ReminderError::InvalidReminderTime { .. } => {
                AppError::InvalidReminderTime(e.to_string())
            }
            ReminderError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidReminderTime(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_REMINDER_TIME",
                msg.clone(),
            ),
            AppError::Catalog(e) if e.is_network() => {
                tracing::error!("Catalog error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "NETWORK_ERROR",
                    "The plant catalog could not be reached".to_string(),
                )
            }
            AppError::Catalog(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "EMPTY_RESPONSE",
                "The catalog returned no data, try again later".to_string(),
            ),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Your plants could not be saved or loaded".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
