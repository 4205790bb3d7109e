//! Mapping from pipeline errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use imgserve_core::PipelineError;
use serde_json::json;

/// A pipeline error on its way out as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::Validation(_)
            | PipelineError::UnsupportedFormat { .. }
            | PipelineError::Decode { .. } => StatusCode::BAD_REQUEST,
            PipelineError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            tracing::warn!("Request failed: {message}");
        } else {
            tracing::debug!("Request rejected: {message}");
        }

        let body = match &self.0 {
            PipelineError::PartialFailure {
                failures,
                succeeded,
            } => {
                let failures: Vec<_> = failures
                    .iter()
                    .map(|f| json!({ "output": f.output, "reason": f.reason }))
                    .collect();
                json!({ "error": message, "failures": failures, "succeeded": succeeded })
            }
            _ => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}
