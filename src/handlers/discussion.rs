//! Reviews on titles and comments on reviews.
//!
//! Both are nested resources: the parent in the path must exist (404 otherwise), and a
//! review is only reachable under the title it belongs to. Edits are open to the author,
//! moderators and admins.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{AppJson, AppPath},
    error::{AppError, AppResult, ErrorBody},
    models::{
        Comment, CreateCommentRequest, CreateReviewRequest, NewComment, NewReview, Review, Title,
        UpdateCommentRequest, UpdateReviewRequest, validate_text,
    },
    permissions::{Action, Actor, Target, authorize, require_user},
    repository::RepositoryState,
};

async fn load_title(repo: &RepositoryState, title_id: i64) -> AppResult<Title> {
    repo.get_title(title_id)
        .await?
        .ok_or_else(|| AppError::not_found("Title"))
}

async fn load_review(repo: &RepositoryState, title_id: i64, review_id: i64) -> AppResult<Review> {
    repo.get_review(title_id, review_id)
        .await?
        .ok_or_else(|| AppError::not_found("Review"))
}

async fn load_comment(
    repo: &RepositoryState,
    title_id: i64,
    review_id: i64,
    comment_id: i64,
) -> AppResult<Comment> {
    load_review(repo, title_id, review_id).await?;
    repo.get_comment(review_id, comment_id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment"))
}

// --- Reviews ---

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title ID")),
    responses(
        (status = 200, description = "Reviews, oldest first", body = [Review]),
        (status = 404, description = "No such title", body = ErrorBody)
    ),
    tag = "reviews"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    AppPath(title_id): AppPath<i64>,
) -> AppResult<Json<Vec<Review>>> {
    load_title(&state.repo, title_id).await?;
    let reviews = state.repo.list_reviews(title_id).await?;
    Ok(Json(reviews))
}

/// create_review
///
/// [Authenticated Route] One review per user per title; a second attempt is a 409.
/// The author is always the caller.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title ID")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 400, description = "Invalid text or score", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 404, description = "No such title", body = ErrorBody),
        (status = 409, description = "Already reviewed by this user", body = ErrorBody)
    ),
    tag = "reviews"
)]
pub async fn create_review(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(title_id): AppPath<i64>,
    AppJson(payload): AppJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    authorize(&actor, Action::Create, Target::Discussion { author: None })?;
    let author = require_user(&actor)?;

    load_title(&state.repo, title_id).await?;
    payload.validate()?;

    if state
        .repo
        .find_review_by_author(title_id, author.id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "You have already reviewed this title.".to_string(),
        ));
    }

    // The storage-level unique constraint still backs this up under concurrent posts.
    let review = state
        .repo
        .create_review(NewReview {
            title_id,
            author_id: author.id,
            text: payload.text,
            score: payload.score,
        })
        .await?;

    tracing::info!(title_id, review_id = review.id, author = %review.author, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    responses(
        (status = 200, description = "Review found", body = Review),
        (status = 404, description = "No such title or review", body = ErrorBody)
    ),
    tag = "reviews"
)]
pub async fn get_review(
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
) -> AppResult<Json<Review>> {
    let review = load_review(&state.repo, title_id, review_id).await?;
    Ok(Json(review))
}

/// update_review
///
/// [Authenticated Route] Text and score only; title and author never move.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = Review),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the author, a moderator or an admin", body = ErrorBody),
        (status = 404, description = "No such title or review", body = ErrorBody)
    ),
    tag = "reviews"
)]
pub async fn update_review(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
    AppJson(payload): AppJson<UpdateReviewRequest>,
) -> AppResult<Json<Review>> {
    require_user(&actor)?;
    let review = load_review(&state.repo, title_id, review_id).await?;
    authorize(
        &actor,
        Action::Modify,
        Target::Discussion {
            author: Some(review.author_id),
        },
    )?;

    let updated = payload.apply_to(review)?;
    let review = state
        .repo
        .update_review(updated)
        .await?
        .ok_or_else(|| AppError::not_found("Review"))?;

    tracing::info!(title_id, review_id, "review updated");
    Ok(Json(review))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    responses(
        (status = 204, description = "Review and its comments deleted"),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the author, a moderator or an admin", body = ErrorBody),
        (status = 404, description = "No such title or review", body = ErrorBody)
    ),
    tag = "reviews"
)]
pub async fn delete_review(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
) -> AppResult<StatusCode> {
    require_user(&actor)?;
    let review = load_review(&state.repo, title_id, review_id).await?;
    authorize(
        &actor,
        Action::Modify,
        Target::Discussion {
            author: Some(review.author_id),
        },
    )?;

    if !state.repo.delete_review(review.id).await? {
        return Err(AppError::not_found("Review"));
    }

    tracing::info!(title_id, review_id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Comments ---

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    responses(
        (status = 200, description = "Comments, oldest first", body = [Comment]),
        (status = 404, description = "No such title or review", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn list_comments(
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
) -> AppResult<Json<Vec<Comment>>> {
    load_review(&state.repo, title_id, review_id).await?;
    let comments = state.repo.list_comments(review_id).await?;
    Ok(Json(comments))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Empty text", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 404, description = "No such title or review", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn create_comment(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
    AppJson(payload): AppJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    authorize(&actor, Action::Create, Target::Discussion { author: None })?;
    let author = require_user(&actor)?;

    load_review(&state.repo, title_id, review_id).await?;
    validate_text(&payload.text)?;

    let comment = state
        .repo
        .create_comment(NewComment {
            review_id,
            author_id: author.id,
            text: payload.text,
        })
        .await?;

    tracing::info!(review_id, comment_id = comment.id, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Comment found", body = Comment),
        (status = 404, description = "No such title, review or comment", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn get_comment(
    State(state): State<AppState>,
    AppPath((title_id, review_id, comment_id)): AppPath<(i64, i64, i64)>,
) -> AppResult<Json<Comment>> {
    let comment = load_comment(&state.repo, title_id, review_id, comment_id).await?;
    Ok(Json(comment))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Comment updated", body = Comment),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the author, a moderator or an admin", body = ErrorBody),
        (status = 404, description = "No such title, review or comment", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn update_comment(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id, comment_id)): AppPath<(i64, i64, i64)>,
    AppJson(payload): AppJson<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    require_user(&actor)?;
    let mut comment = load_comment(&state.repo, title_id, review_id, comment_id).await?;
    authorize(
        &actor,
        Action::Modify,
        Target::Discussion {
            author: Some(comment.author_id),
        },
    )?;

    if let Some(text) = payload.text {
        validate_text(&text)?;
        comment.text = text;
    }

    let comment = state
        .repo
        .update_comment(comment)
        .await?
        .ok_or_else(|| AppError::not_found("Comment"))?;

    tracing::info!(review_id, comment_id, "comment updated");
    Ok(Json(comment))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not the author, a moderator or an admin", body = ErrorBody),
        (status = 404, description = "No such title, review or comment", body = ErrorBody)
    ),
    tag = "comments"
)]
pub async fn delete_comment(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id, comment_id)): AppPath<(i64, i64, i64)>,
) -> AppResult<StatusCode> {
    require_user(&actor)?;
    let comment = load_comment(&state.repo, title_id, review_id, comment_id).await?;
    authorize(
        &actor,
        Action::Modify,
        Target::Discussion {
            author: Some(comment.author_id),
        },
    )?;

    if !state.repo.delete_comment(comment.id).await? {
        return Err(AppError::not_found("Comment"));
    }

    tracing::info!(review_id, comment_id, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
