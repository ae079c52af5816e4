use crate::{
    AppState, auth_middleware,
    handlers::{self, users},
};
use axum::{Router, middleware, routing::get};

/// Users Router Module
///
/// Access Control:
/// - `/users` and `/users/{username}` are admin-only; the check runs in the handlers so
///   that `PUT` answers 405 to every caller.
/// - `/users/me` is wrapped in `auth_middleware`, which rejects anonymous callers with
///   401 before the handler runs.
pub fn user_routes(state: AppState) -> Router<AppState> {
    let own_profile = Router::new()
        // GET/PATCH /users/me
        // The caller's own profile. A `role` field in the PATCH body is ignored.
        .route("/users/me", get(users::get_me).patch(users::update_me))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // GET/POST /users?search=...
        .route("/users", get(users::list_users).post(users::create_user))
        // GET/PATCH/DELETE /users/{username}
        .route(
            "/users/{username}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user)
                .put(handlers::full_update_not_allowed),
        )
        .merge(own_profile)
}
