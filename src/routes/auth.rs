use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Auth Router Module
///
/// The confirmation-code login flow. Both endpoints are unauthenticated.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/signup
        // Registers (or re-registers) a username/email pair and mails a confirmation code.
        .route("/auth/signup", post(handlers::auth::signup))
        // POST /auth/token
        // Trades a username and its confirmation code for a bearer token.
        .route("/auth/token", post(handlers::auth::obtain_token))
}
