//! ユーザー管理API Contract Tests

use crate::support::{create_test_app, create_user, login_token, send};
use axum::http::StatusCode;
use mrotrack::common::auth::UserRole;
use serde_json::json;

#[tokio::test]
async fn test_admin_creates_user_with_generated_password() {
    let t = create_test_app().await;
    let token = login_token(&t.app, "admin").await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/users",
        Some(&token),
        Some(json!({"username": "tech1", "role": "technician"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "technician");
    assert_eq!(body["user"]["must_change_password"], true);
    assert!(body["user"].get("password_hash").is_none());
    let generated = body["generated_password"].as_str().unwrap();

    let (status, body) = crate::support::login(&t.app, "tech1", generated).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["must_change_password"], true);
}

#[tokio::test]
async fn test_duplicate_username_conflicts() {
    let t = create_test_app().await;
    let token = login_token(&t.app, "admin").await;
    let (status, body) = send(
        &t.app,
        "POST",
        "/api/users",
        Some(&token),
        Some(json!({"username": "admin", "role": "viewer", "password": "long-enough-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "conflict_error");
}

#[tokio::test]
async fn test_non_admin_cannot_manage_users() {
    let t = create_test_app().await;
    create_user(&t.state, "tech", UserRole::Technician).await;
    let token = login_token(&t.app, "tech").await;

    let (status, _) = send(&t.app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/users",
        Some(&token),
        Some(json!({"username": "x", "role": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "permission_error");
}

#[tokio::test]
async fn test_last_admin_cannot_be_deleted_or_demoted() {
    let t = create_test_app().await;
    let token = login_token(&t.app, "admin").await;
    let (_, me) = send(&t.app, "GET", "/api/auth/me", Some(&token), None).await;
    let admin_id = me["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &t.app,
        "DELETE",
        &format!("/api/users/{}", admin_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &t.app,
        "PUT",
        &format!("/api/users/{}", admin_id),
        Some(&token),
        Some(json!({"role": "viewer"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 失敗した操作の後もAPIは使える
    let (status, body) = send(&t.app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_user_is_logged() {
    let t = create_test_app().await;
    let viewer_id = create_user(&t.state, "viewer1", UserRole::Viewer).await;
    let token = login_token(&t.app, "admin").await;

    let (status, _) = send(
        &t.app,
        "DELETE",
        &format!("/api/users/{}", viewer_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(
        &t.app,
        "GET",
        "/api/custody/entries?action=user.delete",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["entity_id"], viewer_id.to_string());
}

#[tokio::test]
async fn test_role_change_applies_to_existing_token() {
    let t = create_test_app().await;
    let tech_id = create_user(&t.state, "tech", UserRole::Technician).await;
    let admin = login_token(&t.app, "admin").await;
    let tech = login_token(&t.app, "tech").await;

    let (status, body) = send(
        &t.app,
        "PUT",
        &format!("/api/users/{}", tech_id),
        Some(&admin),
        Some(json!({"role": "viewer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    // 降格前に発行されたトークンでも技術者の操作はできない
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/orders",
        Some(&tech),
        Some(json!({
            "title": "Rivet gun",
            "order_type": "tool",
            "quantity": 1.0,
            "unit": "ea",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&t.app, "GET", "/api/auth/me", Some(&tech), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "viewer");

    let (status, _) = send(
        &t.app,
        "DELETE",
        &format!("/api/users/{}", tech_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&t.app, "GET", "/api/auth/me", Some(&tech), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
