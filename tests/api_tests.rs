mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::{
    JWT_SECRET, body_json, create_test_app, get_with_auth, json_request, seed_user, test_config,
    test_db,
};
use irrigo::{
    create_app,
    db::UserRole,
    jwt::{JwtConfig, SessionClaims},
    rate_limit::RateLimitConfig,
};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

async fn login_token(app: &axum::Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({"email": email, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_success() {
    let (app, db) = create_test_app().await;
    let uuid = seed_user(&db, "a@b.com", "secret", UserRole::Engineer).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({"email": "a@b.com", "password": "secret"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"]["id"], uuid.as_str());
    assert_eq!(json["user"]["email"], "a@b.com");
    assert_eq!(json["user"]["role"], "engineer");

    let token = json["token"].as_str().unwrap();
    let claims = JwtConfig::new(JWT_SECRET)
        .unwrap()
        .validate_session_token(token)
        .unwrap();
    assert_eq!(claims.sub, uuid);
}

#[tokio::test]
async fn test_login_email_is_case_insensitive() {
    let (app, db) = create_test_app().await;
    seed_user(&db, "a@b.com", "secret", UserRole::Viewer).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({"email": "  A@B.com ", "password": "secret"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let (app, db) = create_test_app().await;
    seed_user(&db, "a@b.com", "secret", UserRole::Viewer).await;

    let wrong_password = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({"email": "a@b.com", "password": "wrong"}),
        ))
        .await
        .unwrap();
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = body_json(wrong_password).await;

    let unknown_email = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({"email": "nobody@b.com", "password": "secret"}),
        ))
        .await
        .unwrap();
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let unknown_email = body_json(unknown_email).await;

    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_login_rate_limited() {
    let db = test_db().await;
    let mut config = test_config(db);
    config.rate_limit = RateLimitConfig::with_quotas(1, 2, 1000);
    let app = create_app(&config).unwrap();

    let attempt = || {
        json_request(
            "POST",
            "/api/auth/login",
            json!({"email": "a@b.com", "password": "wrong"}),
        )
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(attempt()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.oneshot(attempt()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("Too many"));
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_success() {
    let (app, db) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({"email": "new@b.com", "password": "password1", "name": "New User"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["user"]["email"], "new@b.com");
    assert_eq!(json["user"]["name"], "New User");
    assert_eq!(json["user"]["role"], "viewer");
    assert!(json["token"].as_str().is_some());

    let stored = db.users().get_by_email("new@b.com").await.unwrap().unwrap();
    assert_eq!(stored.role, UserRole::Viewer);
    assert_ne!(stored.password_hash, "password1");

    // The new account can log in.
    login_token(&app, "new@b.com", "password1").await;
}

#[tokio::test]
async fn test_register_cannot_choose_role() {
    let (app, _db) = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({
                "email": "sneaky@b.com",
                "password": "password1",
                "name": "Sneaky",
                "role": "admin"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["user"]["role"], "viewer");
}

#[tokio::test]
async fn test_register_validation() {
    let (app, _db) = create_test_app().await;

    let cases = [
        json!({"email": "not-an-email", "password": "password1", "name": "A"}),
        json!({"email": "a@b.com", "password": "short", "name": "A"}),
        json!({"email": "a@b.com", "password": "password1", "name": "   "}),
    ];

    for body in cases {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/register", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert!(body_json(response).await["message"].as_str().is_some());
    }
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let (app, db) = create_test_app().await;
    seed_user(&db, "taken@b.com", "secret", UserRole::Viewer).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({"email": "TAKEN@b.com", "password": "password1", "name": "Dup"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await["message"],
        "Email is already registered"
    );
}

// =============================================================================
// Protected routes
// =============================================================================

#[tokio::test]
async fn test_me_returns_identity() {
    let (app, db) = create_test_app().await;
    let uuid = seed_user(&db, "a@b.com", "secret", UserRole::Admin).await;
    let token = login_token(&app, "a@b.com", "secret").await;

    let response = app
        .oneshot(get_with_auth("/api/auth/me", &format!("Bearer {}", token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], uuid.as_str());
    assert_eq!(json["email"], "a@b.com");
    assert_eq!(json["role"], "admin");
}

#[tokio::test]
async fn test_me_without_token() {
    let (app, _db) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Authentication failed");
}

#[tokio::test]
async fn test_me_rejects_non_bearer_scheme() {
    let (app, _db) = create_test_app().await;

    let response = app
        .oneshot(get_with_auth("/api/auth/me", "Basic YTpi"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_rejects_expired_token() {
    let (app, db) = create_test_app().await;
    let uuid = seed_user(&db, "a@b.com", "secret", UserRole::Viewer).await;

    // Correctly signed, but past its expiry.
    let now = now();
    let claims = SessionClaims {
        sub: uuid,
        email: "a@b.com".to_string(),
        name: "Test User".to_string(),
        role: UserRole::Viewer,
        iat: now - 120,
        exp: now - 60,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET),
    )
    .unwrap();

    let response = app
        .oneshot(get_with_auth("/api/auth/me", &format!("Bearer {}", token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Authentication failed");
}

#[tokio::test]
async fn test_me_rejects_tampered_token() {
    let (app, db) = create_test_app().await;
    seed_user(&db, "a@b.com", "secret", UserRole::Viewer).await;
    let token = login_token(&app, "a@b.com", "secret").await;

    // Change the first signature character.
    let signature_start = token.rfind('.').unwrap() + 1;
    let replacement = if token[signature_start..].starts_with('A') { "B" } else { "A" };
    let mut forged = token.clone();
    forged.replace_range(signature_start..signature_start + 1, replacement);

    let response = app
        .clone()
        .oneshot(get_with_auth("/api/auth/me", &format!("Bearer {}", forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Signed with another secret.
    let other = JwtConfig::new(b"some-other-secret-that-is-long-enough")
        .unwrap()
        .generate_session_token(&irrigo::models::UserProfile {
            id: "uuid-x".to_string(),
            email: "a@b.com".to_string(),
            name: "Test User".to_string(),
            role: UserRole::Admin,
        })
        .unwrap()
        .token;

    let response = app
        .oneshot(get_with_auth("/api/auth/me", &format!("Bearer {}", other)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
