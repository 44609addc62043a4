use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::auth::AuthError;
use crate::reservation::ReservationError;

/// Everything a handler can fail with. The only place status codes are chosen.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Auth(AuthError),
    Reservation(ReservationError),
}

impl From<ReservationError> for ApiError {
    fn from(e: ReservationError) -> Self {
        ApiError::Reservation(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Auth(AuthError::Signing(msg)) => {
                tracing::error!("token signing failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            ApiError::Auth(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
            ApiError::Reservation(e) => match e {
                ReservationError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
                ReservationError::Conflict => (StatusCode::CONFLICT, e.to_string()),
                ReservationError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                ReservationError::Forbidden => (StatusCode::FORBIDDEN, e.to_string()),
                ReservationError::Internal(msg) => {
                    tracing::error!("request failed: {msg}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
                }
            },
        };
        (status, message).into_response()
    }
}
