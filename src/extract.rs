//! Request extractors that reject with [`AppError`] instead of axum's plain-text rejections.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JsonBody
///
/// `Json<T>` whose failures (wrong content type, malformed JSON, unknown shape)
/// become a 400 with the usual `{"error": ...}` envelope.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// IdParam
///
/// The `{id}` path segment of a record route. Anything that is not an integer of
/// at least 1 is reported as 404, the same as an id that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParam(pub i64);

impl<S> FromRequestParts<S> for IdParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::NotFound)?;

        match raw.parse::<i64>() {
            Ok(id) if id >= 1 => Ok(Self(id)),
            _ => Err(AppError::NotFound),
        }
    }
}
