use axum::{
    Json, Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::Next,
    response::Response,
    routing::get,
};
use serde_json::json;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod memory;
pub mod models;
pub mod permissions;
pub mod repository;

// One router per resource family, mounted under /api/v1.
pub mod routes;

use auth::AuthUser;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::{HttpMailer, LogMailer, MailerState, MockMailer};
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

use config::AdminBootstrap;
use models::NewUser;
use permissions::Role;

/// ApiDoc
///
/// The OpenAPI document for every `/api/v1` route, served at `/api-docs/openapi.json`
/// and browsable through `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::signup, handlers::auth::obtain_token,
        handlers::users::list_users, handlers::users::create_user, handlers::users::get_user,
        handlers::users::update_user, handlers::users::delete_user,
        handlers::users::get_me, handlers::users::update_me,
        handlers::catalog::list_categories, handlers::catalog::create_category,
        handlers::catalog::delete_category, handlers::catalog::list_genres,
        handlers::catalog::create_genre, handlers::catalog::delete_genre,
        handlers::titles::list_titles, handlers::titles::get_title, handlers::titles::create_title,
        handlers::titles::update_title, handlers::titles::delete_title,
        handlers::full_update_not_allowed,
        handlers::discussion::list_reviews, handlers::discussion::create_review,
        handlers::discussion::get_review, handlers::discussion::update_review,
        handlers::discussion::delete_review, handlers::discussion::list_comments,
        handlers::discussion::create_comment, handlers::discussion::get_comment,
        handlers::discussion::update_comment, handlers::discussion::delete_comment
    ),
    components(
        schemas(
            models::SignupRequest, models::TokenRequest, models::TokenResponse,
            models::CreateUserRequest, models::UpdateUserRequest, models::UpdateMeRequest,
            models::UserProfile, models::CatalogEntry, models::CreateCatalogEntryRequest,
            models::Title, models::CreateTitleRequest, models::UpdateTitleRequest,
            models::Review, models::CreateReviewRequest, models::UpdateReviewRequest,
            models::Comment, models::CreateCommentRequest, models::UpdateCommentRequest,
            permissions::Role, error::ErrorBody,
        )
    ),
    tags(
        (name = "auth", description = "Confirmation-code signup and token exchange"),
        (name = "users", description = "User directory and own profile"),
        (name = "catalog", description = "Categories and genres"),
        (name = "titles", description = "Catalog titles"),
        (name = "reviews", description = "Scored reviews of titles"),
        (name = "comments", description = "Comments on reviews")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared by every request. Holds the repository, the mailer and the immutable configuration.
#[derive(Clone)]
pub struct AppState {
    /// Storage of users, catalog and discussion (Postgres or in-memory).
    pub repo: RepositoryState,
    /// Delivery of confirmation codes.
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards routes that only make sense for a signed-in caller. Extracting `AuthUser`
/// rejects anonymous requests and bad tokens with 401 before the handler runs.
pub(crate) async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// bootstrap_admin
///
/// Makes sure the configured bootstrap account exists as a superuser. An existing user
/// with that username is left as is. Runs once at startup.
pub async fn bootstrap_admin(repo: &RepositoryState, admin: &AdminBootstrap) -> AppResult<()> {
    if repo.get_user_by_username(&admin.username).await?.is_some() {
        tracing::debug!(username = %admin.username, "bootstrap admin already present");
        return Ok(());
    }

    repo.create_user(NewUser {
        role: Role::Admin,
        is_superuser: true,
        ..NewUser::with_identity(admin.username.clone(), admin.email.clone())
    })
    .await?;

    tracing::info!(username = %admin.username, "bootstrap admin created");
    Ok(())
}

/// create_router
///
/// Assembles the routing tree, registers the state and wraps everything in the
/// observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health
        // Liveness probe for load balancers; touches no dependency.
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: every log line of a request carries its method, URI
/// and `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
