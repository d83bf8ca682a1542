//! キットAPI Contract Tests

use crate::support::{create_test_app, create_tool, login_token, send};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_kit_items_add_list_remove() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let tool_id = create_tool(&t.app, &admin, "TW-001").await;

    let (status, kit) = send(
        &t.app,
        "POST",
        "/api/kits",
        Some(&admin),
        Some(json!({"name": "A320 wheel change", "aircraft_type": "A320"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let kit_id = kit["id"].as_i64().unwrap();

    let (status, item) = send(
        &t.app,
        "POST",
        &format!("/api/kits/{}/items", kit_id),
        Some(&admin),
        Some(json!({"item_type": "tool", "item_id": tool_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", item);
    assert_eq!(item["quantity"], 1.0);
    let item_id = item["id"].as_i64().unwrap();

    // 同じ工具の重複追加
    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/api/kits/{}/items", kit_id),
        Some(&admin),
        Some(json!({"item_type": "tool", "item_id": tool_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 存在しない化学品
    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/api/kits/{}/items", kit_id),
        Some(&admin),
        Some(json!({"item_type": "chemical", "item_id": 404})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &t.app,
        "GET",
        &format!("/api/kits/{}", kit_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &t.app,
        "DELETE",
        &format!("/api/kits/{}/items/{}", kit_id, item_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(
        &t.app,
        "GET",
        &format!("/api/kits/{}", kit_id),
        Some(&admin),
        None,
    )
    .await;
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_kit_is_not_found() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let (status, _) = send(&t.app, "GET", "/api/kits/77", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
