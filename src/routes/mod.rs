/// Router Module Index
///
/// One router per resource family, all mounted under `/api/v1` by `create_router`.
/// Access control lives in the handlers (through `permissions::authorize`), except for
/// `/users/me`, which additionally sits behind the authentication middleware.

/// Signup and token exchange. Public.
pub mod auth;

/// Categories, genres and titles. Public reads, admin writes.
pub mod catalog;

/// Reviews and their comments, nested under titles.
pub mod discussion;

/// The admin user directory and the self-service `/users/me` profile.
pub mod users;

use axum::Router;

use crate::AppState;

/// All versioned API routes, before the `/api/v1` prefix is applied.
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(auth::auth_routes())
        .merge(catalog::catalog_routes())
        .merge(discussion::discussion_routes())
        .merge(users::user_routes(state))
}
