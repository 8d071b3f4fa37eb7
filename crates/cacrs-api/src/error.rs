//! Mapping of core errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    Core(cacrs_core::Error),
    Unauthorized,
    Forbidden,
}

impl From<cacrs_core::Error> for ApiError {
    fn from(err: cacrs_core::Error) -> Self {
        ApiError::Core(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use cacrs_core::Error;

        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication required".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "administrator role required".to_string(),
            ),
            ApiError::Core(err) => {
                let status = match &err {
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    Error::Auth(_) => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    log::error!("Request failed: {err}");
                }
                (status, err.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
