#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use review_catalog::{
    AppConfig, AppState, InMemoryRepository, MockMailer, create_router,
    auth::issue_token,
    models::{NewUser, User},
    permissions::Role,
    repository::RepositoryState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// TestApp
///
/// The full router over the in-memory store and a recording mailer. Requests go
/// through `oneshot`, so no socket is opened.
pub struct TestApp {
    pub router: Router,
    pub repo: RepositoryState,
    pub mailer: MockMailer,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
        let mailer = MockMailer::new();

        let router = create_router(AppState {
            repo: repo.clone(),
            mailer: Arc::new(mailer.clone()),
            config: config.clone(),
        });

        Self {
            router,
            repo,
            mailer,
            config,
        }
    }

    /// Sends one request and returns the status with the decoded JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }

    /// Inserts a user straight into the store and returns it with a valid token.
    pub async fn user_with_role(&self, username: &str, role: Role) -> (User, String) {
        let user = self
            .repo
            .create_user(NewUser {
                role,
                ..NewUser::with_identity(username.to_string(), format!("{username}@example.com"))
            })
            .await
            .unwrap();
        let token = issue_token(user.id, &self.config).unwrap();
        (user, token)
    }

    pub async fn admin(&self) -> String {
        self.user_with_role("admin", Role::Admin).await.1
    }

    /// Seeds a category, two genres and one title; returns the title id.
    pub async fn seed_title(&self, admin_token: &str) -> i64 {
        self.post(
            "/api/v1/categories",
            Some(admin_token),
            serde_json::json!({ "name": "Films", "slug": "films" }),
        )
        .await;
        for (name, slug) in [("Drama", "drama"), ("Comedy", "comedy")] {
            self.post(
                "/api/v1/genres",
                Some(admin_token),
                serde_json::json!({ "name": name, "slug": slug }),
            )
            .await;
        }
        let (status, title) = self
            .post(
                "/api/v1/titles",
                Some(admin_token),
                serde_json::json!({
                    "name": "The Godfather",
                    "year": 1972,
                    "description": "An offer you can't refuse.",
                    "genre": ["drama"],
                    "category": "films"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        title["id"].as_i64().unwrap()
    }
}
