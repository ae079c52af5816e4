//! HTTP handlers, one module per resource. Every handler takes the request-scoped
//! [`Actor`](crate::permissions::Actor) (or nothing, for public reads) explicitly and
//! returns `AppResult`, so all failures render through `AppError`.

pub mod auth;
pub mod catalog;
pub mod discussion;
pub mod titles;
pub mod users;

use crate::error::AppError;

/// full_update_not_allowed
///
/// Bound to `PUT` on users, titles, reviews and comments. Only partial updates are
/// accepted, whoever the caller is.
#[utoipa::path(
    put,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    responses((status = 405, description = "Full replace is disabled; use PATCH", body = crate::error::ErrorBody)),
    tag = "titles"
)]
pub async fn full_update_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// Storage-level uniqueness failures on identity fields are reported like the early
/// checks: as a 400 validation error.
pub(crate) fn conflict_as_validation(err: AppError) -> AppError {
    match err {
        AppError::Conflict(detail) => AppError::Validation(detail),
        other => other,
    }
}
