//! 調達依頼API Contract Tests

use crate::support::{create_test_app, create_user, login_token, send};
use axum::{http::StatusCode, Router};
use mrotrack::common::auth::UserRole;
use serde_json::{json, Value};

async fn create_order(app: &Router, token: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/orders",
        Some(token),
        Some(json!({
            "title": "Replacement O-rings",
            "order_type": "expendable",
            "part_number": "MS29513-012",
            "quantity": 50.0,
            "unit": "ea",
            "priority": "high",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

async fn set_status(app: &Router, token: &str, id: i64, body: Value) -> (StatusCode, Value) {
    send(
        app,
        "PUT",
        &format!("/api/orders/{}/status", id),
        Some(token),
        Some(body),
    )
    .await
}

#[tokio::test]
async fn test_order_lifecycle_new_to_received() {
    let t = create_test_app().await;
    create_user(&t.state, "tech", UserRole::Technician).await;
    let admin = login_token(&t.app, "admin").await;
    let tech = login_token(&t.app, "tech").await;

    let order = create_order(&t.app, &tech).await;
    assert_eq!(order["status"], "new");
    assert_eq!(order["priority"], "high");
    let id = order["id"].as_i64().unwrap();

    let (status, body) = set_status(
        &t.app,
        &admin,
        id,
        json!({"status": "ordered", "vendor": "Aero Supply"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["vendor"], "Aero Supply");
    assert!(body["ordered_at"].is_string());

    let (status, body) = set_status(
        &t.app,
        &admin,
        id,
        json!({"status": "shipped", "tracking_number": "1Z999"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracking_number"], "1Z999");
    assert_eq!(body["vendor"], "Aero Supply");

    let (status, body) = set_status(&t.app, &admin, id, json!({"status": "received"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["received_at"].is_string());

    // 終端状態からは動かせない
    let (status, body) = set_status(&t.app, &admin, id, json!({"status": "cancelled"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "conflict_error");
}

#[tokio::test]
async fn test_illegal_transition_conflicts() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let id = create_order(&t.app, &admin).await["id"].as_i64().unwrap();

    let (status, _) = set_status(&t.app, &admin, id, json!({"status": "shipped"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(
        &t.app,
        "GET",
        &format!("/api/orders/{}", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(body["status"], "new");
}

#[tokio::test]
async fn test_technician_cannot_change_status() {
    let t = create_test_app().await;
    create_user(&t.state, "tech", UserRole::Technician).await;
    let tech = login_token(&t.app, "tech").await;
    let id = create_order(&t.app, &tech).await["id"].as_i64().unwrap();

    let (status, _) = set_status(&t.app, &tech, id, json!({"status": "cancelled"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_orders_by_status() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let first = create_order(&t.app, &admin).await["id"].as_i64().unwrap();
    create_order(&t.app, &admin).await;
    set_status(&t.app, &admin, first, json!({"status": "cancelled"})).await;

    let (status, body) = send(&t.app, "GET", "/api/orders?status=new", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&t.app, "GET", "/api/orders", Some(&admin), None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}
