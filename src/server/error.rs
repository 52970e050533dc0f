//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, ApiError>`; every library error converts into
//! it with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pixshare_common::Error;
use serde_json::json;

use crate::images::{EncodeError, UploadError};

/// JSON error response: `{"error": message, "code": code}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Authentication required",
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let (status, code) = match &e {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<EncodeError> for ApiError {
    fn from(e: EncodeError) -> Self {
        let (status, code) = match &e {
            EncodeError::Decode(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_image"),
            EncodeError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            EncodeError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Encode(e) => e.into(),
            UploadError::Store(e) => e.into(),
            UploadError::Fetch(msg) => Self::new(
                StatusCode::BAD_GATEWAY,
                "fetch_failed",
                format!("Failed to fetch image: {}", msg),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                error = %self.message,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": self.message,
            "code": self.code,
        });

        (self.status, axum::Json(body)).into_response()
    }
}
