use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// AppError
///
/// Every failure a request can end in. Each variant maps to exactly one HTTP status in
/// the `IntoResponse` impl below, and the `Display` text becomes the `detail` field.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or missing fields, rule violations, identity conflicts. 400.
    #[error("{0}")]
    Validation(String),

    /// No usable credentials on an operation that needs them. 401.
    #[error("Authentication credentials were not provided or are invalid.")]
    Unauthorized,

    /// Authenticated, but the role/ownership check denied the action. 403.
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    /// Full-replace updates are disabled; only PATCH is accepted. 405.
    #[error("Method \"PUT\" not allowed.")]
    MethodNotAllowed,

    /// A uniqueness rule was violated (e.g. a second review on the same title). 409.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("token signing error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// ErrorBody
///
/// The JSON shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub detail: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found."))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status.is_server_error() {
            // Internal details stay in the logs.
            tracing::error!(error = %self, "request failed");
            "Internal server error.".to_string()
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
            self.to_string()
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

/// Postgres unique violations map to `AppError::Conflict`. Foreign-key violations (a parent
/// row deleted between lookup and insert) map to `AppError::NotFound`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return AppError::Conflict(format!("Duplicate entry violates {constraint}."));
            }
            if db_err.is_foreign_key_violation() {
                return AppError::NotFound("Related object not found.".to_string());
            }
        }
        AppError::Database(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
