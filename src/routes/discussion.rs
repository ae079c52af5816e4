use crate::{
    AppState,
    handlers::{self, discussion},
};
use axum::{Router, routing::get};

/// Discussion Router Module
///
/// Reviews live under their title and comments under their review. Anyone may read;
/// posting needs a token; edits are for the author, moderators and admins.
pub fn discussion_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /titles/{title_id}/reviews
        // A second review by the same user on the same title is rejected with 409.
        .route(
            "/titles/{title_id}/reviews",
            get(discussion::list_reviews).post(discussion::create_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            get(discussion::get_review)
                .patch(discussion::update_review)
                .delete(discussion::delete_review)
                .put(handlers::full_update_not_allowed),
        )
        // GET/POST /titles/{title_id}/reviews/{review_id}/comments
        // The review must belong to the title in the path.
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(discussion::list_comments).post(discussion::create_comment),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            get(discussion::get_comment)
                .patch(discussion::update_comment)
                .delete(discussion::delete_comment)
                .put(handlers::full_update_not_allowed),
        )
}
