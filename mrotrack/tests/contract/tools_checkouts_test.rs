//! 工具・貸出API Contract Tests

use crate::support::{create_test_app, create_tool, create_user, login_token, send};
use axum::http::StatusCode;
use mrotrack::common::auth::UserRole;
use serde_json::json;

#[tokio::test]
async fn test_viewer_can_read_but_not_create_tools() {
    let t = create_test_app().await;
    create_user(&t.state, "viewer", UserRole::Viewer).await;
    let admin = login_token(&t.app, "admin").await;
    let viewer = login_token(&t.app, "viewer").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;

    let (status, body) = send(&t.app, "GET", "/api/tools", Some(&viewer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &t.app,
        "GET",
        &format!("/api/tools/{}", tool_id),
        Some(&viewer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/tools",
        Some(&viewer),
        Some(json!({"tool_number": "TW-002", "description": "Crimper"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_tool_number_conflicts() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    create_tool(&t.app, &admin, "TW-001").await;
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/tools",
        Some(&admin),
        Some(json!({"tool_number": "TW-001", "description": "Another"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let (status, body) = send(&t.app, "GET", "/api/tools/999", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found_error");
}

#[tokio::test]
async fn test_checkout_then_double_checkout_conflicts() {
    let t = create_test_app().await;
    create_user(&t.state, "tech", UserRole::Technician).await;
    let admin = login_token(&t.app, "admin").await;
    let tech = login_token(&t.app, "tech").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&tech),
        Some(json!({"tool_id": tool_id, "expected_return_date": "2030-01-31"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["tool"]["status"], "checked_out");
    assert!(body["checkout"]["returned_at"].is_null());

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&admin),
        Some(json!({"tool_id": tool_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &t.app,
        "GET",
        "/api/checkouts?active=true",
        Some(&tech),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_return_frees_tool_and_second_return_conflicts() {
    let t = create_test_app().await;
    create_user(&t.state, "tech", UserRole::Technician).await;
    let admin = login_token(&t.app, "admin").await;
    let tech = login_token(&t.app, "tech").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;

    let (_, body) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&tech),
        Some(json!({"tool_id": tool_id})),
    )
    .await;
    let checkout_id = body["checkout"]["id"].as_i64().unwrap();

    // ボディなしでも返却できる
    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/checkouts/{}/return", checkout_id),
        Some(&tech),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["tool"]["status"], "available");
    assert!(body["checkout"]["returned_at"].is_string());

    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/api/checkouts/{}/return", checkout_id),
        Some(&tech),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 返却後は再度貸し出せる
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&tech),
        Some(json!({"tool_id": tool_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_damaged_return_sends_tool_to_maintenance() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;
    let (_, body) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&admin),
        Some(json!({"tool_id": tool_id})),
    )
    .await;
    let checkout_id = body["checkout"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/checkouts/{}/return", checkout_id),
        Some(&admin),
        Some(json!({"condition": "damaged", "notes": "cracked handle"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tool"]["status"], "maintenance");

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&admin),
        Some(json!({"tool_id": tool_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_viewer_cannot_checkout() {
    let t = create_test_app().await;
    create_user(&t.state, "viewer", UserRole::Viewer).await;
    let admin = login_token(&t.app, "admin").await;
    let viewer = login_token(&t.app, "viewer").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&viewer),
        Some(json!({"tool_id": tool_id})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_technician_cannot_checkout_for_someone_else() {
    let t = create_test_app().await;
    let other = create_user(&t.state, "other", UserRole::Technician).await;
    create_user(&t.state, "tech", UserRole::Technician).await;
    let admin = login_token(&t.app, "admin").await;
    let tech = login_token(&t.app, "tech").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&tech),
        Some(json!({"tool_id": tool_id, "user_id": other})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/checkouts",
        Some(&admin),
        Some(json!({"tool_id": tool_id, "user_id": other})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["checkout"]["user_id"], other.to_string());
}

#[tokio::test]
async fn test_retire_tool_keeps_row() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;

    let (status, body) = send(
        &t.app,
        "DELETE",
        &format!("/api/tools/{}", tool_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "retired");

    let (status, _) = send(
        &t.app,
        "PUT",
        &format!("/api/tools/{}/status", tool_id),
        Some(&admin),
        Some(json!({"status": "available"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
