//! API error type and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use slot_scheduler::SchedulerError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Alert {0} not found")]
    AlertNotFound(Uuid),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Scheduler(SchedulerError::UnknownSlot(_)) | ApiError::AlertNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Scheduler(SchedulerError::DuplicateSlot(_)) => StatusCode::CONFLICT,
            ApiError::Scheduler(SchedulerError::InvalidSensitivity(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Scheduler(SchedulerError::UnknownSlot(3)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Scheduler(SchedulerError::InvalidSensitivity(f32::NAN)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadRequest("missing slot".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Startup("bind".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
