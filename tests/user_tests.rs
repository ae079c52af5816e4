mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use review_catalog::{bootstrap_admin, config::AdminBootstrap, permissions::Role};
use serde_json::json;

// --- /users/me ---

#[tokio::test]
async fn test_me_requires_authentication() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/v1/users/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/users/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_patch_updates_profile_but_never_role() {
    let app = TestApp::new();
    let (_, token) = app.user_with_role("alice", Role::User).await;

    let (status, me) = app
        .patch(
            "/api/v1/users/me",
            Some(&token),
            json!({ "first_name": "Alice", "bio": "Film buff", "role": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["first_name"], "Alice");
    assert_eq!(me["bio"], "Film buff");
    assert_eq!(me["role"], "user");

    // Still a plain user as far as permissions go.
    let (status, _) = app.get("/api/v1/users", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_me_patch_rejects_taken_identity() {
    let app = TestApp::new();
    let (_, token) = app.user_with_role("alice", Role::User).await;
    app.user_with_role("bob", Role::User).await;

    let (status, _) = app
        .patch("/api/v1/users/me", Some(&token), json!({ "username": "bob" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .patch(
            "/api/v1/users/me",
            Some(&token),
            json!({ "email": "bob@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .patch("/api/v1/users/me", Some(&token), json!({ "username": "me" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Re-submitting one's own values is fine.
    let (status, _) = app
        .patch(
            "/api/v1/users/me",
            Some(&token),
            json!({ "username": "alice", "email": "alice@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bio_is_bounded() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (_, token) = app.user_with_role("alice", Role::User).await;
    let long_bio = "x".repeat(256);

    let (status, body) = app
        .patch("/api/v1/users/me", Some(&token), json!({ "bio": long_bio }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("bio"));

    let (status, _) = app
        .post(
            "/api/v1/users",
            Some(&admin),
            json!({ "username": "carol", "email": "carol@example.com", "bio": long_bio }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, me) = app
        .patch("/api/v1/users/me", Some(&token), json!({ "bio": "x".repeat(255) }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["bio"].as_str().unwrap().len(), 255);
}

// --- Admin directory ---

#[tokio::test]
async fn test_directory_is_admin_only() {
    let app = TestApp::new();
    let (_, moderator) = app.user_with_role("moder", Role::Moderator).await;

    let (status, _) = app.get("/api/v1/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/api/v1/users", Some(&moderator)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/v1/users/moder", Some(&moderator)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_manages_users() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let (status, created) = app
        .post(
            "/api/v1/users",
            Some(&admin),
            json!({ "username": "carol", "email": "carol@example.com", "bio": "New here" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["role"], "user");
    assert_eq!(created["first_name"], "");

    let (status, _) = app
        .post(
            "/api/v1/users",
            Some(&admin),
            json!({ "username": "carol", "email": "other@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, found) = app.get("/api/v1/users?search=car", Some(&admin)).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["username"], "carol");

    let (status, promoted) = app
        .patch(
            "/api/v1/users/carol",
            Some(&admin),
            json!({ "role": "moderator" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "moderator");
    assert_eq!(promoted["bio"], "New here");

    let (status, _) = app.delete("/api/v1/users/carol", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.get("/api/v1/users/carol", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "User not found.");
}

#[tokio::test]
async fn test_role_change_applies_to_existing_tokens() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (_, token) = app.user_with_role("dave", Role::User).await;

    let (status, _) = app.get("/api/v1/users", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.patch("/api/v1/users/dave", Some(&admin), json!({ "role": "admin" }))
        .await;

    let (status, _) = app.get("/api/v1/users", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_deleted_user_token_stops_working() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (_, token) = app.user_with_role("erin", Role::User).await;

    app.delete("/api/v1/users/erin", Some(&admin)).await;

    let (status, _) = app.get("/api/v1/users/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_put_is_405_even_for_admin() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.user_with_role("frank", Role::User).await;

    for token in [None, Some(admin.as_str())] {
        let (status, body) = app
            .send(
                Method::PUT,
                "/api/v1/users/frank",
                token,
                Some(json!({ "username": "frank", "email": "f@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["detail"], "Method \"PUT\" not allowed.");
    }
}

// --- Bootstrap ---

#[tokio::test]
async fn test_bootstrap_admin_is_idempotent_superuser() {
    let app = TestApp::new();
    let seed = AdminBootstrap {
        username: "root".to_string(),
        email: "root@example.com".to_string(),
    };

    bootstrap_admin(&app.repo, &seed).await.unwrap();
    bootstrap_admin(&app.repo, &seed).await.unwrap();

    let root = app.repo.get_user_by_username("root").await.unwrap().unwrap();
    assert!(root.is_superuser);
    assert_eq!(root.role, Role::Admin);

    let users = app.repo.list_users(None).await.unwrap();
    assert_eq!(users.len(), 1);
}
