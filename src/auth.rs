use axum::{
    Json,
    extract::{
        FromRef, FromRequest, FromRequestParts, Path, Query, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::User,
    permissions::{Actor, Role},
    repository::RepositoryState,
};

/// Claims
///
/// The payload signed into every access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id. Used to re-load the user and role on every request.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: i64,
    /// Issued At (iat), seconds since the epoch.
    pub iat: i64,
}

/// issue_token
///
/// Signs an HS256 access token for `user_id` valid for `config.access_token_ttl_secs`.
pub fn issue_token(user_id: Uuid, config: &AppConfig) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + config.access_token_ttl_secs,
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    Ok(encode(&Header::default(), &claims, &key)?)
}

/// verify_token
///
/// Checks signature and expiry and returns the subject.
pub fn verify_token(token: &str, config: &AppConfig) -> Option<Uuid> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Some(data.claims.sub),
        Err(e) => {
            tracing::debug!(error = ?e.kind(), "rejected bearer token");
            None
        }
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            is_superuser: user.is_superuser,
        }
    }
}

/// Actor Extractor Implementation
///
/// Resolves the caller of every request:
/// 1. No `Authorization` header: `Actor::Anonymous`.
/// 2. A header that is not `Bearer <token>`, or a token failing signature/expiry checks: 401.
/// 3. A valid token whose user no longer exists: 401.
///
/// The user is re-read from the repository so role changes and deletions apply to
/// tokens that were issued earlier.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Actor::Anonymous);
        };

        let token = auth_header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let config = AppConfig::from_ref(state);
        let user_id = verify_token(token, &config).ok_or(AppError::Unauthorized)?;

        let repo = RepositoryState::from_ref(state);
        let user = repo.get_user(user_id).await?.ok_or(AppError::Unauthorized)?;

        Ok(Actor::User(user.into()))
    }
}

/// AuthUser Extractor Implementation
///
/// Same resolution as [`Actor`], but anonymous callers are rejected with 401.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Actor::from_request_parts(parts, state).await? {
            Actor::User(user) => Ok(user),
            Actor::Anonymous => Err(AppError::Unauthorized),
        }
    }
}

/// AppJson
///
/// `axum::Json` with rejections (bad syntax, missing fields, wrong content type)
/// reported as 400 `{detail}` instead of axum's plain-text 4xx.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

/// AppPath
///
/// `axum::extract::Path` whose rejections (a non-numeric id, bad percent-encoding)
/// come back as 400 `{detail}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppPath<T>(pub T);

impl<S, T> FromRequestParts<S> for AppPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(AppPath(value))
    }
}

/// AppQuery
///
/// Query-string counterpart of [`AppPath`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(AppQuery(value))
    }
}
