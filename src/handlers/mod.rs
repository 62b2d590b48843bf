//! HTTP handlers, grouped by resource.
//!
//! Every handler returns `Result<_, AppError>`; the error's `IntoResponse` produces
//! the JSON error envelope. Guards run before these functions, so an admin-only
//! handler never checks the role itself.

use axum::http::HeaderValue;

use crate::{error::AppError, filters::SortSpec};

pub mod activities;
pub mod answers;
pub mod health;
pub mod questions;
pub mod users;

pub const ACTIVITY_SORT: SortSpec = SortSpec {
    default: "-created_at",
    safelist: &[
        "id", "name", "answers_sum", "created_at",
        "-id", "-name", "-answers_sum", "-created_at",
    ],
};

pub const QUESTION_SORT: SortSpec = SortSpec {
    default: "id",
    safelist: &["id", "title", "-id", "-title"],
};

pub const IKIGAI_SORT: SortSpec = SortSpec {
    default: "-created_at",
    safelist: &["created_at", "email", "name", "-created_at", "-email", "-name"],
};

/// `Location` header value for a freshly created record.
fn location(collection: &str, id: i64) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!("/{collection}/{id}"))
        .map_err(|e| AppError::Internal(format!("invalid location header: {e}")))
}
