//! API error type and HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use optimus_core::{ErrorKind, OptimusError};
use serde::{Deserialize, Serialize};
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Stable machine-readable code, e.g. `NOT_FOUND`.
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiErrorBody {
                code: self.code.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<OptimusError> for ApiError {
    fn from(err: OptimusError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::not_found(message),
            ErrorKind::InvalidArgument => Self::bad_request(message),
            ErrorKind::AlreadyExists => Self::new(StatusCode::CONFLICT, "ALREADY_EXISTS", message),
            ErrorKind::FailedPrecondition => {
                Self::new(StatusCode::PRECONDITION_FAILED, "FAILED_PRECONDITION", message)
            }
            ErrorKind::InvalidStateTransition | ErrorKind::Internal => {
                error!(error = %message, "request failed");
                Self::internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_kinds_map_to_statuses() {
        let cases = [
            (OptimusError::not_found("resource", "x"), StatusCode::NOT_FOUND),
            (OptimusError::invalid_argument("resource", "x"), StatusCode::BAD_REQUEST),
            (OptimusError::already_exists("resource", "x"), StatusCode::CONFLICT),
            (
                OptimusError::failed_precondition("resource", "x"),
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                OptimusError::invalid_state_transition("resource", "x"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (OptimusError::internal("resource", "x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn message_keeps_entity_context() {
        let err = ApiError::from(OptimusError::not_found("resource", "no record for a.b.c"));
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.message().contains("no record for a.b.c"));
    }
}
