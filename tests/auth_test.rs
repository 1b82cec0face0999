mod common;

use axum::http::Method;
use common::{response_json, TestApp, TEST_PASSWORD};
use serde_json::json;

#[tokio::test]
async fn register_then_fetch_profile() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "name": "Kavya Iyer",
                "email": "Kavya@Example.com",
                "password": "s3cret!!",
                "phone": "9123456780"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["message"], "User registered successfully");
    let user = &body["data"]["user"];
    assert_eq!(user["email"], "kavya@example.com");
    assert_eq!(user["role"], "user");
    assert!(user.get("password_hash").is_none());

    let token = body["data"]["token"].as_str().expect("token").to_string();
    let response = app.request(Method::GET, "/api/auth/me", None, Some(&token)).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["user"]["name"], "Kavya Iyer");
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "name": "Someone Else",
                "email": "priya@example.com",
                "password": "another1"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), 409);
    let body = response_json(response).await;
    assert_eq!(body["message"], "User already exists with this email");
}

#[tokio::test]
async fn registration_input_is_validated() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/register",
            Some(json!({ "name": "K", "email": "not-an-email", "password": "123" })),
            None,
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Validation failed");
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert_eq!(fields, vec!["email", "name", "password"]);
}

#[tokio::test]
async fn login_checks_the_password() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "priya@example.com", "password": TEST_PASSWORD })),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Login successful");
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "priya@example.com", "password": "wrong-password" })),
            None,
        )
        .await;
    assert_eq!(response.status(), 401);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn garbage_tokens_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/auth/me", None, Some("definitely.not.a.jwt"))
        .await;
    assert_eq!(response.status(), 401);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/health", None, None).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);

    let response = app.request(Method::GET, "/api/health/ready", None, None).await;
    assert_eq!(response.status(), 200);

    let response = app.request(Method::GET, "/api/nowhere", None, None).await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Route not found");
    assert!(body["request_id"].is_string());
}
