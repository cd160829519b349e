//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Rejection for requests that lack a resolved, user-bound session.
#[derive(Debug)]
pub enum AuthError {
    /// Cookie absent, session unknown or expired, or no user attached.
    Unauthorized,
    /// Session lookup itself failed.
    Internal,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AuthError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}
