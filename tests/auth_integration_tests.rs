mod common;

use axum::{
    extract::FromRequestParts,
    http::{Request, StatusCode, header},
};
use common::TestApp;
use review_catalog::{
    AppConfig, AppState, InMemoryRepository, MockMailer,
    auth::{AuthUser, Claims, issue_token},
    models::NewUser,
    permissions::{Actor, Role},
    repository::RepositoryState,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

// --- Signup and token exchange over HTTP ---

async fn signup(app: &TestApp, username: &str, email: &str) -> StatusCode {
    app.post(
        "/api/v1/auth/signup",
        None,
        json!({ "username": username, "email": email }),
    )
    .await
    .0
}

#[tokio::test]
async fn test_signup_mails_code_that_buys_a_token() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/v1/auth/signup",
            None,
            json!({ "username": "bob", "email": "bob@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "username": "bob", "email": "bob@example.com" }));

    let code = app.mailer.last_code_for("bob@example.com").expect("code was mailed");

    let (status, body) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "bob", "confirmation_code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().expect("token in body").to_string();

    let (status, me) = app.get("/api/v1/users/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "bob");
    assert_eq!(me["role"], "user");
}

#[tokio::test]
async fn test_reserved_username_is_rejected_everywhere() {
    let app = TestApp::new();

    assert_eq!(signup(&app, "me", "me@example.com").await, StatusCode::BAD_REQUEST);
    assert!(app.mailer.sent().is_empty());

    let (status, body) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "me", "confirmation_code": "whatever" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("reserved"));
}

#[tokio::test]
async fn test_token_for_unknown_user_is_404() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "ghost", "confirmation_code": "abc" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "User not found.");
}

#[tokio::test]
async fn test_wrong_code_is_400() {
    let app = TestApp::new();
    signup(&app, "bob", "bob@example.com").await;

    let (status, body) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "bob", "confirmation_code": "not-the-code" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid confirmation code.");
}

#[tokio::test]
async fn test_resignup_with_same_pair_replaces_the_code() {
    let app = TestApp::new();
    assert_eq!(signup(&app, "bob", "bob@example.com").await, StatusCode::OK);
    let first = app.mailer.last_code_for("bob@example.com").unwrap();

    assert_eq!(signup(&app, "bob", "bob@example.com").await, StatusCode::OK);
    let second = app.mailer.last_code_for("bob@example.com").unwrap();
    assert_ne!(first, second);
    assert_eq!(app.mailer.sent().len(), 2);

    let (stale, _) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "bob", "confirmation_code": first }),
        )
        .await;
    assert_eq!(stale, StatusCode::BAD_REQUEST);

    let (fresh, _) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "bob", "confirmation_code": second }),
        )
        .await;
    assert_eq!(fresh, StatusCode::OK);
}

#[tokio::test]
async fn test_signup_identity_conflicts_are_400() {
    let app = TestApp::new();
    signup(&app, "bob", "bob@example.com").await;

    // Known username, different email.
    assert_eq!(signup(&app, "bob", "other@example.com").await, StatusCode::BAD_REQUEST);
    // Known email, different username.
    assert_eq!(signup(&app, "robert", "bob@example.com").await, StatusCode::BAD_REQUEST);
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_admin_created_user_can_sign_in_through_signup() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let (status, _) = app
        .post(
            "/api/v1/users",
            Some(&admin),
            json!({ "username": "mod", "email": "mod@example.com", "role": "moderator" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(signup(&app, "mod", "mod@example.com").await, StatusCode::OK);
    let code = app.mailer.last_code_for("mod@example.com").unwrap();
    let (status, body) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "mod", "confirmation_code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let token = body["token"].as_str().unwrap();
    let (_, me) = app.get("/api/v1/users/me", Some(token)).await;
    assert_eq!(me["role"], "moderator");
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let app = TestApp::with_config(AppConfig {
        confirmation_code_ttl_secs: -1,
        ..AppConfig::default()
    });
    signup(&app, "bob", "bob@example.com").await;
    let code = app.mailer.last_code_for("bob@example.com").unwrap();

    let (status, _) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({ "username": "bob", "confirmation_code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_signup_body_is_400_with_detail() {
    let app = TestApp::new();
    let (status, body) = app
        .post("/api/v1/auth/signup", None, json!({ "username": "bob" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

// --- Actor extractor ---

fn test_state(repo: &Arc<InMemoryRepository>) -> AppState {
    AppState {
        repo: repo.clone() as RepositoryState,
        mailer: Arc::new(MockMailer::new()),
        config: AppConfig::default(),
    }
}

fn parts_with_auth(value: Option<&str>) -> axum::http::request::Parts {
    let mut builder = Request::builder().uri("/");
    if let Some(value) = value {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(()).unwrap().into_parts().0
}

#[tokio::test]
async fn test_actor_without_header_is_anonymous() {
    let repo = Arc::new(InMemoryRepository::new());
    let state = test_state(&repo);

    let actor = Actor::from_request_parts(&mut parts_with_auth(None), &state)
        .await
        .unwrap();
    assert!(matches!(actor, Actor::Anonymous));
}

#[tokio::test]
async fn test_actor_resolves_current_role_from_store() {
    let repo = Arc::new(InMemoryRepository::new());
    let state = test_state(&repo);
    let user = state
        .repo
        .create_user(NewUser {
            role: Role::Moderator,
            ..NewUser::with_identity("kate".into(), "kate@example.com".into())
        })
        .await
        .unwrap();
    let token = issue_token(user.id, &state.config).unwrap();

    let auth_user = AuthUser::from_request_parts(
        &mut parts_with_auth(Some(&format!("Bearer {token}"))),
        &state,
    )
    .await
    .unwrap();
    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.role, Role::Moderator);
}

#[tokio::test]
async fn test_bad_credentials_are_401() {
    let repo = Arc::new(InMemoryRepository::new());
    let state = test_state(&repo);

    // Not a bearer header.
    let err = Actor::from_request_parts(&mut parts_with_auth(Some("Basic abc")), &state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

    // Signed with another secret.
    let claims = Claims {
        sub: Uuid::new_v4(),
        iat: chrono::Utc::now().timestamp(),
        exp: chrono::Utc::now().timestamp() + 60,
    };
    let forged = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    let err = Actor::from_request_parts(
        &mut parts_with_auth(Some(&format!("Bearer {forged}"))),
        &state,
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

    // Valid signature, but the user is gone.
    let orphan = issue_token(Uuid::new_v4(), &state.config).unwrap();
    let err = Actor::from_request_parts(
        &mut parts_with_auth(Some(&format!("Bearer {orphan}"))),
        &state,
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_401() {
    let repo = Arc::new(InMemoryRepository::new());
    let state = test_state(&repo);
    let user = state
        .repo
        .create_user(NewUser::with_identity("old".into(), "old@example.com".into()))
        .await
        .unwrap();

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user.id,
        iat: now - 7200,
        exp: now - 3600,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .unwrap();

    let result = AuthUser::from_request_parts(
        &mut parts_with_auth(Some(&format!("Bearer {token}"))),
        &state,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_anonymous_is_rejected_by_auth_user() {
    let repo = Arc::new(InMemoryRepository::new());
    let state = test_state(&repo);

    let err = AuthUser::from_request_parts(&mut parts_with_auth(None), &state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}
