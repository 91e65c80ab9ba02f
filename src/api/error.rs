use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::projection::ProjectionError;
use crate::scheduler::SchedulerError;
use crate::status::WebhookUrlError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidWebhook(#[from] WebhookUrlError),

    #[error("process number must not be empty")]
    EmptyProcessNumber,

    #[error("upstream metadata unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidWebhook(_) | ApiError::EmptyProcessNumber => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable(_) | ApiError::StorageUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidWebhook(_) => "INVALID_WEBHOOK",
            ApiError::EmptyProcessNumber => "EMPTY_PROCESS_NUMBER",
            ApiError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ApiError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(value: SchedulerError) -> Self {
        match value {
            SchedulerError::InvalidWebhook(e) => ApiError::InvalidWebhook(e),
            SchedulerError::EmptyProcessNumber => ApiError::EmptyProcessNumber,
            SchedulerError::UpstreamMetadataUnavailable(e) => ApiError::UpstreamUnavailable(e),
            SchedulerError::StorageUnavailable(e) => ApiError::StorageUnavailable(e),
            SchedulerError::Ledger(e) => ApiError::Internal(e.to_string()),
            SchedulerError::Broker(e) => ApiError::Internal(e),
        }
    }
}

impl From<ProjectionError> for ApiError {
    fn from(value: ProjectionError) -> Self {
        match value {
            ProjectionError::ProcessNotFound(p) => ApiError::NotFound(format!("process {p}")),
            ProjectionError::Ledger(e) => ApiError::Internal(e.to_string()),
            ProjectionError::Storage(e) => ApiError::StorageUnavailable(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}
