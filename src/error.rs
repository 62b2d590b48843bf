use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{auth::AuthError, repository::RepositoryError, validator::ValidationErrors};

/// AppError
///
/// Every failure a handler can surface. Each variant maps to exactly one status code;
/// the response body is always a JSON envelope with a single `error` key.
#[derive(Debug, Error)]
pub enum AppError {
    /// One or more request fields failed validation (422).
    #[error("failed validation: {0}")]
    Validation(ValidationErrors),

    /// Unknown or malformed record id (404).
    #[error("the requested resource could not be found")]
    NotFound,

    /// A conditional update matched zero rows (409).
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// Missing or invalid session, insufficient role, or ownership violation (403).
    #[error("forbidden: {0}")]
    Forbidden(#[from] AuthError),

    /// Malformed request body (400).
    #[error("{0}")]
    BadRequest(String),

    /// Login attempted with an unknown email or a wrong password (400).
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Rejected by the global rate limiter (429).
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Unexpected failure outside the persistence layer (500).
    #[error("internal error: {0}")]
    Internal(String),

    /// Unclassified persistence failure (500).
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";
const FORBIDDEN_MESSAGE: &str =
    "your user account doesn't have the necessary permissions to access this resource";

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::InvalidCredentials => StatusCode::BAD_REQUEST,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::RecordNotFound => Self::NotFound,
            RepositoryError::EditConflict => Self::EditConflict,
            RepositoryError::DuplicateEmail => Self::Validation(ValidationErrors::single(
                "email",
                "a user with this email address already exists",
            )),
            RepositoryError::Database(e) => Self::Database(e),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(errors) => json!({ "error": errors }),
            Self::Forbidden(reason) => {
                // The reason stays server-side; every forbidden outcome looks the same on the wire.
                tracing::debug!(%reason, "request forbidden");
                json!({ "error": FORBIDDEN_MESSAGE })
            }
            Self::Internal(_) | Self::Database(_) => {
                tracing::error!(error = %self, "request failed");
                json!({ "error": SERVER_ERROR_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
