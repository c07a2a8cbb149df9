//! Mapping of pipeline failures to HTTP responses.
//!
//! Provider and storage details never leave the process: clients only see the
//! public message of each error class.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cryptopulse_core::PipelineError;
use cryptopulse_pipeline::LifecycleError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    Lifecycle(LifecycleError),
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl ApiError {
    /// Status code and client-facing message.
    #[must_use]
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Pipeline(e) => {
                let status = match e {
                    PipelineError::ProviderUnavailable { .. }
                    | PipelineError::NoMarketDataAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    PipelineError::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    PipelineError::PersistenceConflict { .. } => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.public_message().to_string())
            }
            Self::Lifecycle(e @ LifecycleError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            Self::Lifecycle(e @ LifecycleError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            Self::Lifecycle(e @ LifecycleError::InvalidFeedback(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::Lifecycle(LifecycleError::Storage(_)) | Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            match &self {
                Self::Pipeline(e) => tracing::error!("Request failed: {}", e),
                Self::Lifecycle(e) => tracing::error!("Request failed: {:#}", e),
                Self::Internal(e) => tracing::error!("Request failed: {:#}", e),
                _ => {}
            }
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}
