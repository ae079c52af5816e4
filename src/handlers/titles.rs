use axum::{
    Json,
    extract::State,
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{AppJson, AppPath, AppQuery},
    error::{AppError, AppResult, ErrorBody},
    models::{
        CatalogKind, CreateTitleRequest, Title, TitleDraft, TitleFilter, UpdateTitleRequest,
        validate_name, validate_year,
    },
    permissions::{Action, Actor, Target, authorize},
    repository::RepositoryState,
};

// --- Slug resolution ---

async fn resolve_category(repo: &RepositoryState, slug: Option<&str>) -> AppResult<Option<i64>> {
    let Some(slug) = slug else {
        return Ok(None);
    };
    let entry = repo
        .get_catalog_entry(CatalogKind::Category, slug)
        .await?
        .ok_or_else(|| AppError::Validation(format!("Unknown category slug \"{slug}\".")))?;
    Ok(Some(entry.id))
}

/// Genre slugs to ids, in request order with duplicates dropped.
async fn resolve_genres(repo: &RepositoryState, slugs: &[String]) -> AppResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let entry = repo
            .get_catalog_entry(CatalogKind::Genre, slug)
            .await?
            .ok_or_else(|| AppError::Validation(format!("Unknown genre slug \"{slug}\".")))?;
        if !ids.contains(&entry.id) {
            ids.push(entry.id);
        }
    }
    Ok(ids)
}

fn draft_of(title: &Title) -> TitleDraft {
    TitleDraft {
        name: title.name.clone(),
        year: title.year,
        description: title.description.clone(),
        category_id: title.category.as_ref().map(|c| c.id),
        genre_ids: title.genre.iter().map(|g| g.id).collect(),
    }
}

// --- Handlers ---

/// list_titles
///
/// [Public Route] Titles, newest year first. Every provided filter must match:
/// `name` is a case-insensitive substring, `category` and `genre` are slugs.
#[utoipa::path(
    get,
    path = "/api/v1/titles",
    params(TitleFilter),
    responses((status = 200, description = "Matching titles", body = [Title])),
    tag = "titles"
)]
pub async fn list_titles(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<TitleFilter>,
) -> AppResult<Json<Vec<Title>>> {
    let titles = state.repo.list_titles(&filter).await?;
    Ok(Json(titles))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    responses(
        (status = 200, description = "Title with its computed rating", body = Title),
        (status = 404, description = "No such title", body = ErrorBody)
    ),
    tag = "titles"
)]
pub async fn get_title(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<Title>> {
    let title = state
        .repo
        .get_title(id)
        .await?
        .ok_or_else(|| AppError::not_found("Title"))?;
    Ok(Json(title))
}

/// create_title
///
/// [Admin Route] Category and genres are given by slug; an unknown slug is a 400.
#[utoipa::path(
    post,
    path = "/api/v1/titles",
    request_body = CreateTitleRequest,
    responses(
        (status = 201, description = "Title created", body = Title),
        (status = 400, description = "Invalid payload or unknown slug", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    tag = "titles"
)]
pub async fn create_title(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateTitleRequest>,
) -> AppResult<(StatusCode, Json<Title>)> {
    authorize(&actor, Action::Create, Target::Catalog)?;
    payload.validate()?;

    let category_id = resolve_category(&state.repo, payload.category.as_deref()).await?;
    let genre_ids = resolve_genres(&state.repo, &payload.genre).await?;

    let title = state
        .repo
        .create_title(TitleDraft {
            name: payload.name,
            year: payload.year,
            description: payload.description,
            category_id,
            genre_ids,
        })
        .await?;

    tracing::info!(title_id = title.id, name = %title.name, "title created");
    Ok((StatusCode::CREATED, Json(title)))
}

/// update_title
///
/// [Admin Route] Partial update. A `genre` list replaces the whole set; an explicit
/// `null` category or description clears it.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Title updated", body = Title),
        (status = 400, description = "Invalid payload or unknown slug", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No such title", body = ErrorBody)
    ),
    tag = "titles"
)]
pub async fn update_title(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdateTitleRequest>,
) -> AppResult<Json<Title>> {
    authorize(&actor, Action::Modify, Target::Catalog)?;

    let current = state
        .repo
        .get_title(id)
        .await?
        .ok_or_else(|| AppError::not_found("Title"))?;
    let mut draft = draft_of(&current);

    if let Some(name) = payload.name {
        validate_name(&name)?;
        draft.name = name;
    }
    if let Some(year) = payload.year {
        validate_year(year)?;
        draft.year = year;
    }
    if let Some(description) = payload.description {
        draft.description = description;
    }
    if let Some(category) = payload.category {
        draft.category_id = resolve_category(&state.repo, category.as_deref()).await?;
    }
    if let Some(genre) = payload.genre {
        draft.genre_ids = resolve_genres(&state.repo, &genre).await?;
    }

    let title = state
        .repo
        .update_title(id, draft)
        .await?
        .ok_or_else(|| AppError::not_found("Title"))?;

    tracing::info!(title_id = id, "title updated");
    Ok(Json(title))
}

/// delete_title
///
/// [Admin Route] Removes the title together with its reviews and their comments.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    responses(
        (status = 204, description = "Title deleted"),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No such title", body = ErrorBody)
    ),
    tag = "titles"
)]
pub async fn delete_title(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Modify, Target::Catalog)?;

    if !state.repo.delete_title(id).await? {
        return Err(AppError::not_found("Title"));
    }

    tracing::info!(title_id = id, "title deleted");
    Ok(StatusCode::NO_CONTENT)
}
