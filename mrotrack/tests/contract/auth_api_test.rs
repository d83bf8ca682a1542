//! 認証API Contract Tests
//!
//! POST /api/auth/login, GET /api/auth/me, PUT /api/auth/password

use crate::support::{create_test_app, login, login_token, send, TEST_PASSWORD};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_login_success() {
    let t = create_test_app().await;
    let (status, body) = login(&t.app, "admin", TEST_PASSWORD).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["expires_in"], 86400);
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["must_change_password"], false);
}

#[tokio::test]
async fn test_login_wrong_password_is_unauthorized() {
    let t = create_test_app().await;
    let (status, body) = login(&t.app, "admin", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_login_unknown_user_is_unauthorized() {
    let t = create_test_app().await;
    let (status, _) = login(&t.app, "nobody", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let t = create_test_app().await;
    let (status, _) = send(&t.app, "GET", "/api/tools", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, "GET", "/api/tools", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_current_user() {
    let t = create_test_app().await;
    let token = login_token(&t.app, "admin").await;
    let (status, body) = send(&t.app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");
    assert!(body["last_login"].is_string());
}

#[tokio::test]
async fn test_login_is_recorded_in_custody_log() {
    let t = create_test_app().await;
    let token = login_token(&t.app, "admin").await;
    let (status, body) = send(
        &t.app,
        "GET",
        "/api/custody/entries?action=auth.login",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["actor"], "admin");
}

#[tokio::test]
async fn test_change_password_flow() {
    let t = create_test_app().await;
    let token = login_token(&t.app, "admin").await;

    // 現在のパスワードが違う
    let (status, _) = send(
        &t.app,
        "PUT",
        "/api/auth/password",
        Some(&token),
        Some(json!({"current_password": "nope", "new_password": "new-password-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 短すぎる
    let (status, _) = send(
        &t.app,
        "PUT",
        "/api/auth/password",
        Some(&token),
        Some(json!({"current_password": TEST_PASSWORD, "new_password": "short"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        "PUT",
        "/api/auth/password",
        Some(&token),
        Some(json!({"current_password": TEST_PASSWORD, "new_password": "new-password-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    let (status, _) = login(&t.app, "admin", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&t.app, "admin", "new-password-1").await;
    assert_eq!(status, StatusCode::OK);
}
