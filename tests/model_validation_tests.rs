use review_catalog::{
    AppError,
    models::{
        CatalogEntry, Comment, CreateTitleRequest, Review, Title, UpdateReviewRequest,
        UpdateTitleRequest, UpdateUserRequest, User, UserProfile, validate_email,
        validate_score, validate_username,
    },
    permissions::Role,
};
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_username_rules() {
    assert!(validate_username("bob.smith+1@home_x-y").is_ok());
    assert!(matches!(validate_username("me"), Err(AppError::Validation(_))));
    assert!(validate_username("").is_err());
    assert!(validate_username("has space").is_err());
    assert!(validate_username(&"a".repeat(151)).is_err());
}

#[test]
fn test_email_and_score_rules() {
    assert!(validate_email("bob@example.com").is_ok());
    assert!(validate_email("bob@localhost").is_err());
    assert!(validate_email("no-at-sign").is_err());

    assert!(validate_score(1).is_ok());
    assert!(validate_score(10).is_ok());
    assert!(validate_score(0).is_err());
    assert!(validate_score(11).is_err());
}

#[test]
fn test_title_request_defaults() {
    let req: CreateTitleRequest =
        serde_json::from_value(json!({ "name": "Solaris", "year": 1972 })).unwrap();
    assert!(req.genre.is_empty());
    assert_eq!(req.category, None);
    assert_eq!(req.description, None);
    assert!(req.validate().is_ok());
}

#[test]
fn test_title_patch_distinguishes_null_from_absent() {
    let absent: UpdateTitleRequest = serde_json::from_value(json!({ "name": "X" })).unwrap();
    assert_eq!(absent.category, None);
    assert_eq!(absent.description, None);

    let cleared: UpdateTitleRequest =
        serde_json::from_value(json!({ "category": null, "description": null })).unwrap();
    assert_eq!(cleared.category, Some(None));
    assert_eq!(cleared.description, Some(None));

    let set: UpdateTitleRequest =
        serde_json::from_value(json!({ "category": "films" })).unwrap();
    assert_eq!(set.category, Some(Some("films".to_string())));
}

#[test]
fn test_title_serializes_catalog_entries_without_ids() {
    let title = Title {
        id: 3,
        name: "Solaris".into(),
        year: 1972,
        rating: None,
        description: None,
        genre: vec![CatalogEntry {
            id: 11,
            name: "Sci-Fi".into(),
            slug: "sci-fi".into(),
        }],
        category: Some(CatalogEntry {
            id: 5,
            name: "Films".into(),
            slug: "films".into(),
        }),
    };

    let value = serde_json::to_value(&title).unwrap();
    assert_eq!(
        value,
        json!({
            "id": 3,
            "name": "Solaris",
            "year": 1972,
            "rating": null,
            "description": null,
            "genre": [{ "name": "Sci-Fi", "slug": "sci-fi" }],
            "category": { "name": "Films", "slug": "films" }
        })
    );
}

#[test]
fn test_review_and_comment_hide_author_ids() {
    let review = Review {
        id: 1,
        title_id: 2,
        author_id: Uuid::new_v4(),
        author: "alice".into(),
        text: "Great".into(),
        score: 9,
        ..Review::default()
    };
    let value = serde_json::to_value(&review).unwrap();
    assert_eq!(value["title"], 2);
    assert_eq!(value["author"], "alice");
    assert!(value.get("author_id").is_none());
    assert!(value.get("title_id").is_none());

    let comment = Comment {
        id: 4,
        review_id: 1,
        author: "bob".into(),
        text: "Agreed".into(),
        ..Comment::default()
    };
    let value = serde_json::to_value(&comment).unwrap();
    assert_eq!(value["review"], 1);
    assert!(value.get("author_id").is_none());
}

#[test]
fn test_review_patch_validates_merged_fields() {
    let review = Review {
        text: "Fine".into(),
        score: 5,
        ..Review::default()
    };

    let patched = UpdateReviewRequest {
        score: Some(7),
        text: None,
    }
    .apply_to(review.clone())
    .unwrap();
    assert_eq!(patched.score, 7);
    assert_eq!(patched.text, "Fine");

    let rejected = UpdateReviewRequest {
        score: Some(42),
        text: None,
    }
    .apply_to(review);
    assert!(rejected.is_err());
}

#[test]
fn test_user_patch_and_profile_shape() {
    let user = User {
        username: "alice".into(),
        email: "alice@example.com".into(),
        ..User::default()
    };

    let updated = UpdateUserRequest {
        role: Some(Role::Moderator),
        bio: Some("Hi".into()),
        ..UpdateUserRequest::default()
    }
    .apply_to(user)
    .unwrap();
    assert_eq!(updated.role, Role::Moderator);

    let profile = serde_json::to_value(UserProfile::from(updated)).unwrap();
    assert_eq!(
        profile,
        json!({
            "username": "alice",
            "email": "alice@example.com",
            "first_name": "",
            "last_name": "",
            "bio": "Hi",
            "role": "moderator"
        })
    );
}
