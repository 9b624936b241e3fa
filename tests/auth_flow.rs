mod support;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use support::TestApp;

fn registration(email: &str) -> serde_json::Value {
    json!({ "name": "Ada", "email": email, "password": "correct-horse" })
}

#[tokio::test]
async fn register_returns_session_without_password_hash() {
    let app = TestApp::builder().build();

    let response = app
        .post_json("/api/auth/register", registration("ada@example.com"))
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let body = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "User registered successfully");
    assert_eq!(body["data"]["user"]["email"], "ada@example.com");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let token = body["data"]["token"].as_str().expect("token");
    let profile = app.get("/api/profile", token).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.json()["data"]["email"], "ada@example.com");
    assert_eq!(profile.json()["data"]["user_id"], body["data"]["user"]["id"]);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = TestApp::builder().build();
    app.post_json("/api/auth/register", registration("twice@example.com"))
        .await;

    let response = app
        .post_json("/api/auth/register", registration("twice@example.com"))
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json()["message"], "Email already registered");
}

#[tokio::test]
async fn short_password_is_rejected() {
    let app = TestApp::builder().build();

    let response = app
        .post_json(
            "/api/auth/register",
            json!({ "name": "Ada", "email": "short@example.com", "password": "abc" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["status"], "error");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::builder().build();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\":"))
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["status"], "error");
}

#[tokio::test]
async fn login_accepts_the_registered_password_only() {
    let app = TestApp::builder().build();
    app.post_json("/api/auth/register", registration("login@example.com"))
        .await;

    let ok = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "login@example.com", "password": "correct-horse" }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.json()["message"], "Login successful");
    assert!(ok.json()["data"]["token"].is_string());

    let wrong = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "login@example.com", "password": "battery-staple" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.json()["message"], "Invalid email or password");

    let unknown = app
        .post_json(
            "/api/auth/login",
            json!({ "email": "nobody@example.com", "password": "correct-horse" }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.json()["message"], "Invalid email or password");
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = TestApp::builder().build();

    let missing = app
        .send(
            Request::builder()
                .uri("/api/files/")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.json()["message"], "Authorization header required");
    assert!(missing.x_cache().is_none());

    let forged = app.get("/api/files/", "not-a-jwt").await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.json()["message"], "Invalid or expired token");
    assert!(forged.x_cache().is_none());
}
