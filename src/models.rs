use chrono::{DateTime, Datelike, Utc};
use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, de};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{error::AppError, permissions::Role};

/// The username reserved for the self-service `/users/me` endpoint.
pub const RESERVED_USERNAME: &str = "me";

pub const USERNAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;
pub const NAME_MAX_LEN: usize = 256;
pub const SLUG_MAX_LEN: usize = 50;
pub const BIO_MAX_LEN: usize = 255;
pub const SCORE_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical identity record stored in the `users` table. Carries no password:
/// proof of identity goes through the confirmation-code flow.
#[derive(Debug, Clone, PartialEq, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    // Stored as text; unknown values fail the row decode.
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_superuser: bool,
}

/// NewUser
///
/// Everything needed to insert a user. Ids are assigned by the repository.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl NewUser {
    pub fn with_identity(username: String, email: String) -> Self {
        Self {
            username,
            email,
            ..Self::default()
        }
    }
}

/// ConfirmationCode
///
/// The pending proof of contact for a user, kept apart from the profile aggregate.
/// One live code per user; a new signup attempt replaces it.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ConfirmationCode {
    pub user_id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// CatalogEntry
///
/// A category or a genre. Both share the same `{name, slug}` shape and live in
/// separate tables selected by [`CatalogKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CatalogEntry {
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Category,
    Genre,
}

impl CatalogKind {
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Category => "categories",
            CatalogKind::Genre => "genres",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CatalogKind::Category => "Category",
            CatalogKind::Genre => "Genre",
        }
    }
}

/// Title
///
/// A catalog work as returned by the API. `rating` is computed on read from the
/// title's reviews and is `null` while there are none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub genre: Vec<CatalogEntry>,
    pub category: Option<CatalogEntry>,
}

/// TitleDraft
///
/// A fully resolved title write: slugs already turned into ids. Used for both
/// inserts and (merged) partial updates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TitleDraft {
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub genre_ids: Vec<i64>,
}

/// Review
///
/// A user's scored opinion on a title. Unique per `(title_id, author_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Review {
    pub id: i64,
    #[serde(rename = "title")]
    pub title_id: i64,
    #[serde(skip)]
    pub author_id: Uuid,
    // Author's username, loaded via a JOIN.
    pub author: String,
    pub text: String,
    pub score: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub title_id: i64,
    pub author_id: Uuid,
    pub text: String,
    pub score: i32,
}

/// Comment
///
/// A reply attached to a single review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    #[serde(rename = "review")]
    pub review_id: i64,
    #[serde(skip)]
    pub author_id: Uuid,
    pub author: String,
    pub text: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub review_id: i64,
    pub author_id: Uuid,
    pub text: String,
}

// --- Request Payloads (Input Schemas) ---

/// SignupRequest
///
/// Input for `POST /auth/signup`; echoed back unchanged on success.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignupRequest {
    #[schema(example = "bob")]
    pub username: String,
    #[schema(example = "bob@example.com")]
    pub email: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_username(&self.username)?;
        validate_email(&self.email)
    }
}

/// TokenRequest
///
/// Input for `POST /auth/token`: the username plus the code that was mailed to it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenRequest {
    pub username: String,
    pub confirmation_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// CreateUserRequest
///
/// Admin-only user creation. Omitted profile fields default to empty, role to `user`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub role: Role,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_person_name("first_name", &self.first_name)?;
        validate_person_name("last_name", &self.last_name)?;
        validate_bio(&self.bio)
    }
}

/// UpdateUserRequest
///
/// Admin partial update of any user, role included.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// UpdateMeRequest
///
/// Self-service partial update. There is no `role` field: a role sent by the client is
/// an unknown key and is dropped during deserialization, whatever its value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateMeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl From<UpdateMeRequest> for UpdateUserRequest {
    fn from(req: UpdateMeRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            bio: req.bio,
            role: None,
        }
    }
}

impl UpdateUserRequest {
    /// Applies the provided fields on top of `user` and validates the result.
    pub fn apply_to(self, mut user: User) -> Result<User, AppError> {
        if let Some(username) = self.username {
            validate_username(&username)?;
            user.username = username;
        }
        if let Some(email) = self.email {
            validate_email(&email)?;
            user.email = email;
        }
        if let Some(first_name) = self.first_name {
            validate_person_name("first_name", &first_name)?;
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            validate_person_name("last_name", &last_name)?;
            user.last_name = last_name;
        }
        if let Some(bio) = self.bio {
            validate_bio(&bio)?;
            user.bio = bio;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        Ok(user)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateCatalogEntryRequest {
    #[schema(example = "Fantasy")]
    pub name: String,
    #[schema(example = "fantasy")]
    pub slug: String,
}

impl CreateCatalogEntryRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_name(&self.name)?;
        validate_slug(&self.slug)
    }
}

/// CreateTitleRequest
///
/// Category and genres are referenced by slug.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTitleRequest {
    pub name: String,
    pub year: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl CreateTitleRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_name(&self.name)?;
        validate_year(self.year)
    }
}

/// UpdateTitleRequest
///
/// Partial update. For `description` and `category`, an explicit `null` clears the
/// field while an absent key leaves it untouched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateTitleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub category: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateReviewRequest {
    pub text: String,
    #[schema(minimum = 1, maximum = 10)]
    pub score: i32,
}

impl CreateReviewRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_text(&self.text)?;
        validate_score(self.score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
}

impl UpdateReviewRequest {
    pub fn apply_to(self, mut review: Review) -> Result<Review, AppError> {
        if let Some(text) = self.text {
            validate_text(&text)?;
            review.text = text;
        }
        if let Some(score) = self.score {
            validate_score(score)?;
            review.score = score;
        }
        Ok(review)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// --- Query Parameters ---

/// SearchQuery
///
/// `?search=` substring filter used by the category, genre and user listings.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// TitleFilter
///
/// Query parameters for `GET /titles`. All provided filters must match; a blank value
/// (`?year=`) is the same as leaving the filter out.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TitleFilter {
    /// Case-insensitive substring of the title name.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub name: Option<String>,
    /// Same matching as `name`.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub year: Option<i32>,
    /// Category slug.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub category: Option<String>,
    /// Genre slug.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub genre: Option<String>,
}

impl TitleFilter {
    /// Every substring the title name has to contain.
    pub fn name_terms(&self) -> impl Iterator<Item = &str> {
        self.name.iter().chain(self.search.iter()).map(String::as_str)
    }
}

// --- Output Schemas ---

/// UserProfile
///
/// The public shape of a user record. Internal ids and the superuser flag stay private.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
        }
    }
}

// --- Validation ---

fn blank_as_none<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: FromStr,
    T::Err: fmt::Display,
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map(Some).map_err(de::Error::custom)
        }
        _ => Ok(None),
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

pub fn validate_username(username: &str) -> Result<(), AppError> {
    if username == RESERVED_USERNAME {
        return Err(AppError::Validation(format!(
            "Username \"{RESERVED_USERNAME}\" is reserved."
        )));
    }
    if username.is_empty() || username.chars().count() > USERNAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "Username must be between 1 and {USERNAME_MAX_LEN} characters."
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(AppError::Validation(
            "Username may contain only letters, digits and @/./+/-/_ characters.".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let invalid = || AppError::Validation("Enter a valid email address.".to_string());
    if email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.') =>
        {
            Ok(())
        }
        _ => Err(invalid()),
    }
}

pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    if slug.is_empty()
        || slug.len() > SLUG_MAX_LEN
        || !slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::Validation(format!(
            "Slug must be 1 to {SLUG_MAX_LEN} characters of letters, digits, '-' or '_'."
        )));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() || name.chars().count() > NAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "Name must be between 1 and {NAME_MAX_LEN} characters."
        )));
    }
    Ok(())
}

fn validate_person_name(field: &str, value: &str) -> Result<(), AppError> {
    if value.chars().count() > USERNAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at most {USERNAME_MAX_LEN} characters."
        )));
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<(), AppError> {
    if bio.chars().count() > BIO_MAX_LEN {
        return Err(AppError::Validation(format!(
            "bio must be at most {BIO_MAX_LEN} characters."
        )));
    }
    Ok(())
}

pub fn validate_year(year: i32) -> Result<(), AppError> {
    let current = Utc::now().year();
    if year > current {
        return Err(AppError::Validation(format!(
            "Year {year} is in the future (current year is {current})."
        )));
    }
    Ok(())
}

pub fn validate_score(score: i32) -> Result<(), AppError> {
    if !SCORE_RANGE.contains(&score) {
        return Err(AppError::Validation(format!(
            "Score must be between {} and {}.",
            SCORE_RANGE.start(),
            SCORE_RANGE.end()
        )));
    }
    Ok(())
}

pub fn validate_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::Validation("Text must not be empty.".to_string()));
    }
    Ok(())
}
