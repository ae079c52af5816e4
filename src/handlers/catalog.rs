use axum::{
    Json,
    extract::State,
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{AppJson, AppPath, AppQuery},
    error::{AppError, AppResult, ErrorBody},
    handlers::conflict_as_validation,
    models::{CatalogEntry, CatalogKind, CreateCatalogEntryRequest, SearchQuery},
    permissions::{Action, Actor, Target, authorize},
};

// Categories and genres behave identically; the routed handlers below only pick the kind.

async fn list_entries(
    state: &AppState,
    kind: CatalogKind,
    query: SearchQuery,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    let entries = state.repo.list_catalog(kind, query.search).await?;
    Ok(Json(entries))
}

async fn create_entry(
    actor: &Actor,
    state: &AppState,
    kind: CatalogKind,
    payload: CreateCatalogEntryRequest,
) -> AppResult<(StatusCode, Json<CatalogEntry>)> {
    authorize(actor, Action::Create, Target::Catalog)?;
    payload.validate()?;

    if state.repo.get_catalog_entry(kind, &payload.slug).await?.is_some() {
        return Err(AppError::Validation(format!(
            "{} with this slug already exists.",
            kind.label()
        )));
    }

    let entry = state
        .repo
        .create_catalog_entry(kind, payload.name, payload.slug)
        .await
        .map_err(conflict_as_validation)?;

    tracing::info!(kind = kind.label(), slug = %entry.slug, "catalog entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn delete_entry(
    actor: &Actor,
    state: &AppState,
    kind: CatalogKind,
    slug: &str,
) -> AppResult<StatusCode> {
    authorize(actor, Action::Modify, Target::Catalog)?;

    if !state.repo.delete_catalog_entry(kind, slug).await? {
        return Err(AppError::not_found(kind.label()));
    }

    tracing::info!(kind = kind.label(), %slug, "catalog entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Categories ---

/// list_categories
///
/// [Public Route] Categories ordered by name, filtered by `?search=` on the name.
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(SearchQuery),
    responses((status = 200, description = "Categories", body = [CatalogEntry])),
    tag = "catalog"
)]
pub async fn list_categories(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    list_entries(&state, CatalogKind::Category, query).await
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CreateCatalogEntryRequest,
    responses(
        (status = 201, description = "Category created", body = CatalogEntry),
        (status = 400, description = "Invalid or duplicate slug", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    tag = "catalog"
)]
pub async fn create_category(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateCatalogEntryRequest>,
) -> AppResult<(StatusCode, Json<CatalogEntry>)> {
    create_entry(&actor, &state, CatalogKind::Category, payload).await
}

/// delete_category
///
/// [Admin Route] Titles in the category keep existing with no category.
#[utoipa::path(
    delete,
    path = "/api/v1/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No such category", body = ErrorBody)
    ),
    tag = "catalog"
)]
pub async fn delete_category(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> AppResult<StatusCode> {
    delete_entry(&actor, &state, CatalogKind::Category, &slug).await
}

// --- Genres ---

#[utoipa::path(
    get,
    path = "/api/v1/genres",
    params(SearchQuery),
    responses((status = 200, description = "Genres", body = [CatalogEntry])),
    tag = "catalog"
)]
pub async fn list_genres(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    list_entries(&state, CatalogKind::Genre, query).await
}

#[utoipa::path(
    post,
    path = "/api/v1/genres",
    request_body = CreateCatalogEntryRequest,
    responses(
        (status = 201, description = "Genre created", body = CatalogEntry),
        (status = 400, description = "Invalid or duplicate slug", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    tag = "catalog"
)]
pub async fn create_genre(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateCatalogEntryRequest>,
) -> AppResult<(StatusCode, Json<CatalogEntry>)> {
    create_entry(&actor, &state, CatalogKind::Genre, payload).await
}

/// delete_genre
///
/// [Admin Route] The genre is detached from every title that carried it.
#[utoipa::path(
    delete,
    path = "/api/v1/genres/{slug}",
    params(("slug" = String, Path, description = "Genre slug")),
    responses(
        (status = 204, description = "Genre deleted"),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No such genre", body = ErrorBody)
    ),
    tag = "catalog"
)]
pub async fn delete_genre(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> AppResult<StatusCode> {
    delete_entry(&actor, &state, CatalogKind::Genre, &slug).await
}
