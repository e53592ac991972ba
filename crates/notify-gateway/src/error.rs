//! Error taxonomy shared across the gateway

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed, tampered or expired token. Recoverable: identity
    /// resolution treats it as "no identity" and moves on.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// An identity was required and none could be resolved.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The resolved identity does not own the target notification.
    #[error("not authorized to access this notification")]
    Forbidden,

    #[error("notification not found")]
    NotFound,

    /// The store rejected one or more field values.
    #[error("validation failed")]
    Validation(Vec<String>),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ValidationBody {
    errors: Vec<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Error::InvalidToken(message) => (StatusCode::UNAUTHORIZED, "Invalid token", message),
            Error::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "Authentication required".into(),
            ),
            Error::Forbidden => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                "You are not authorized to access this notification".into(),
            ),
            Error::NotFound => (
                StatusCode::NOT_FOUND,
                "Not Found",
                "Notification not found".into(),
            ),
            Error::Validation(errors) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ValidationBody { errors }),
                )
                    .into_response();
            }
            Error::Internal(message) => {
                tracing::error!(%message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    message,
                )
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}
