use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AppJson, AppPath, AppQuery},
    error::{AppError, AppResult, ErrorBody},
    handlers::conflict_as_validation,
    models::{
        CreateUserRequest, NewUser, SearchQuery, UpdateMeRequest, UpdateUserRequest, User,
        UserProfile,
    },
    permissions::{Action, Actor, Target, authorize, require_user},
    repository::RepositoryState,
};

// --- Helpers ---

/// Rejects a username or email already held by someone other than `owner`.
async fn ensure_identity_available(
    repo: &RepositoryState,
    username: &str,
    email: &str,
    owner: Option<Uuid>,
) -> AppResult<()> {
    let taken_by_other = |holder: Option<User>| holder.is_some_and(|h| Some(h.id) != owner);

    if taken_by_other(repo.get_user_by_username(username).await?) {
        return Err(AppError::Validation(
            "A user with that username already exists.".to_string(),
        ));
    }
    if taken_by_other(repo.get_user_by_email(email).await?) {
        return Err(AppError::Validation(
            "A user with that email already exists.".to_string(),
        ));
    }
    Ok(())
}

async fn find_by_username(repo: &RepositoryState, username: &str) -> AppResult<User> {
    repo.get_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

async fn save_patch(repo: &RepositoryState, current: User, patch: UpdateUserRequest) -> AppResult<User> {
    let updated = patch.apply_to(current)?;
    ensure_identity_available(repo, &updated.username, &updated.email, Some(updated.id)).await?;

    repo.update_user(updated)
        .await
        .map_err(conflict_as_validation)?
        .ok_or_else(|| AppError::not_found("User"))
}

// --- Directory (admin) ---

/// list_users
///
/// [Admin Route] Every user, optionally narrowed by `?search=` on the username.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(SearchQuery),
    responses(
        (status = 200, description = "Users ordered by username", body = [UserProfile]),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn list_users(
    actor: Actor,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<UserProfile>>> {
    authorize(&actor, Action::Read, Target::UserDirectory)?;

    let users = state.repo.list_users(query.search).await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// create_user
///
/// [Admin Route] Creates a user directly, with any role. The new user still signs in
/// through the confirmation-code flow.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Invalid or duplicate identity", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn create_user(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    authorize(&actor, Action::Create, Target::UserDirectory)?;
    payload.validate()?;
    ensure_identity_available(&state.repo, &payload.username, &payload.email, None).await?;

    let user = state
        .repo
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            first_name: payload.first_name,
            last_name: payload.last_name,
            bio: payload.bio,
            role: payload.role,
            is_superuser: false,
        })
        .await
        .map_err(conflict_as_validation)?;

    tracing::info!(username = %user.username, role = user.role.as_str(), "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "User found", body = UserProfile),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_user(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
) -> AppResult<Json<UserProfile>> {
    authorize(&actor, Action::Read, Target::UserDirectory)?;

    let user = find_by_username(&state.repo, &username).await?;
    Ok(Json(user.into()))
}

/// update_user
///
/// [Admin Route] Partial update of any user, role included.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserProfile),
        (status = 400, description = "Invalid or duplicate identity", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_user(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    authorize(&actor, Action::Modify, Target::UserDirectory)?;

    let current = find_by_username(&state.repo, &username).await?;
    let updated = save_patch(&state.repo, current, payload).await?;

    tracing::info!(username = %updated.username, "user updated");
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn delete_user(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Modify, Target::UserDirectory)?;

    let user = find_by_username(&state.repo, &username).await?;
    if !state.repo.delete_user(user.id).await? {
        return Err(AppError::not_found("User"));
    }

    tracing::info!(%username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Self-service ---

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Own profile", body = UserProfile),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_me(actor: Actor, State(state): State<AppState>) -> AppResult<Json<UserProfile>> {
    authorize(&actor, Action::Read, Target::OwnProfile)?;
    let me = require_user(&actor)?;

    let user = state
        .repo
        .get_user(me.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated Route] Partial update of the caller's own profile. The role can
/// never change through this route.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Own profile updated", body = UserProfile),
        (status = 400, description = "Invalid or duplicate identity", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_me(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpdateMeRequest>,
) -> AppResult<Json<UserProfile>> {
    authorize(&actor, Action::Modify, Target::OwnProfile)?;
    let me = require_user(&actor)?;

    let current = state
        .repo
        .get_user(me.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let updated = save_patch(&state.repo, current, payload.into()).await?;

    tracing::debug!(username = %updated.username, "profile updated");
    Ok(Json(updated.into()))
}
