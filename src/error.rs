use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

/// Domain error for the credential and token components.
///
/// `Database` and `Internal` carry backend failures through unchanged;
/// they are never reclassified as one of the domain kinds.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Error::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Error::Conflict(m) => (StatusCode::CONFLICT, m),
            Error::Validation(m) => (StatusCode::BAD_REQUEST, m),
            // One body for missing/malformed/expired/unknown; auth endpoints
            // must not reveal which it was.
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated".to_string()),
            Error::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            Error::Internal(m) => {
                error!(error = %m, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, message).into_response()
    }
}
