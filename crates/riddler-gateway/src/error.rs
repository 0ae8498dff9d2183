use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use riddler_core::error::RiddleError;

/// Message returned for any failure that is not the client's fault.
pub const PROCESSING_FAILED: &str = "Failed to process question";

/// Handler error, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Riddle(RiddleError),
}

impl From<RiddleError> for ApiError {
    fn from(e: RiddleError) -> Self {
        ApiError::Riddle(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Riddle(RiddleError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Riddle(RiddleError::StepMismatch { .. }) => StatusCode::CONFLICT,
            ApiError::Riddle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.to_string(),
            ApiError::Riddle(e) if e.is_session_error() => e.to_string(),
            ApiError::Riddle(e) => {
                error!(error = %e, "Request failed");
                PROCESSING_FAILED.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::BadRequest("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(RiddleError::SessionNotFound("s".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(RiddleError::StepMismatch {
                expected: "a".into(),
                actual: "b".into()
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RiddleError::LlmRequest("HTTP 500".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
