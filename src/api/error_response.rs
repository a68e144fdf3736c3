//! HTTP error response handling for the API
//!
//! Domain errors become a status code from [`ToHttpStatus`] plus an
//! [`ApiError`] JSON body.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(error = %self, status = status_code.as_u16(), "request failed");
        }

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Errors with a known status go through Error::into_response
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
