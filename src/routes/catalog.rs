use crate::{
    AppState,
    handlers::{self, catalog, titles},
};
use axum::{
    Router,
    routing::{delete, get},
};

/// Catalog Router Module
///
/// Categories, genres and titles. Reads are open to everyone; every write is checked
/// against the admin tier inside the handler.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /categories?search=...
        .route(
            "/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        // DELETE /categories/{slug}
        // Titles in the category survive with `category: null`.
        .route("/categories/{slug}", delete(catalog::delete_category))
        // GET/POST /genres?search=...
        .route(
            "/genres",
            get(catalog::list_genres).post(catalog::create_genre),
        )
        // DELETE /genres/{slug}
        .route("/genres/{slug}", delete(catalog::delete_genre))
        // GET/POST /titles?name=...&year=...&category=...&genre=...
        .route("/titles", get(titles::list_titles).post(titles::create_title))
        // GET/PATCH/DELETE /titles/{id}
        // PUT is answered with 405: titles only accept partial updates.
        .route(
            "/titles/{id}",
            get(titles::get_title)
                .patch(titles::update_title)
                .delete(titles::delete_title)
                .put(handlers::full_update_not_allowed),
        )
}
