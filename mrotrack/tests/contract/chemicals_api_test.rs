//! 化学品API Contract Tests

use crate::support::{create_test_app, create_user, login_token, send};
use axum::{http::StatusCode, Router};
use mrotrack::common::auth::UserRole;
use serde_json::json;

const MINIMUM_STOCK: f64 = 10.0;

async fn create_chemical(app: &Router, token: &str, quantity: f64) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/chemicals",
        Some(token),
        Some(json!({
            "part_number": "MIL-PRF-81733",
            "lot_number": "LOT-2024-07",
            "description": "Sealant, polysulfide",
            "quantity": quantity,
            "unit": "ml",
            "minimum_stock_level": MINIMUM_STOCK,
            "expiration_date": "2099-12-31",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let expected = if quantity > MINIMUM_STOCK {
        "available"
    } else {
        "low_stock"
    };
    assert_eq!(body["status"], expected);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_issue_reduces_quantity_and_records_issuance() {
    let t = create_test_app().await;
    create_user(&t.state, "tech", UserRole::Technician).await;
    let admin = login_token(&t.app, "admin").await;
    let tech = login_token(&t.app, "tech").await;
    let id = create_chemical(&t.app, &admin, 500.0).await;

    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/chemicals/{}/issue", id),
        Some(&tech),
        Some(json!({"quantity": 150.0, "purpose": "WO-1182 panel reseal"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["chemical"]["quantity"], 350.0);
    assert_eq!(body["issuance"]["quantity"], 150.0);

    let (status, body) = send(
        &t.app,
        "GET",
        &format!("/api/chemicals/{}/issuances", id),
        Some(&tech),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_issue_cannot_overdraw() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let id = create_chemical(&t.app, &admin, 50.0).await;

    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/chemicals/{}/issue", id),
        Some(&admin),
        Some(json!({"quantity": 75.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "conflict_error");

    // 在庫は変わらない
    let (_, body) = send(
        &t.app,
        "GET",
        &format!("/api/chemicals/{}", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(body["quantity"], 50.0);
}

#[tokio::test]
async fn test_issue_rejects_non_positive_quantity() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let id = create_chemical(&t.app, &admin, 50.0).await;
    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/api/chemicals/{}/issue", id),
        Some(&admin),
        Some(json!({"quantity": 0.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_issue_to_zero_depletes() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let id = create_chemical(&t.app, &admin, 20.0).await;
    let (status, body) = send(
        &t.app,
        "POST",
        &format!("/api/chemicals/{}/issue", id),
        Some(&admin),
        Some(json!({"quantity": 20.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chemical"]["status"], "depleted");
}

#[tokio::test]
async fn test_viewer_cannot_issue() {
    let t = create_test_app().await;
    create_user(&t.state, "viewer", UserRole::Viewer).await;
    let admin = login_token(&t.app, "admin").await;
    let viewer = login_token(&t.app, "viewer").await;
    let id = create_chemical(&t.app, &admin, 20.0).await;
    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/api/chemicals/{}/issue", id),
        Some(&viewer),
        Some(json!({"quantity": 1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_fractional_issues_drain_lot_completely() {
    let t = create_test_app().await;
    let admin = login_token(&t.app, "admin").await;
    let id = create_chemical(&t.app, &admin, 0.3).await;

    let mut last = serde_json::Value::Null;
    for _ in 0..3 {
        let (status, body) = send(
            &t.app,
            "POST",
            &format!("/api/chemicals/{}/issue", id),
            Some(&admin),
            Some(json!({"quantity": 0.1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        last = body;
    }
    assert_eq!(last["chemical"]["quantity"], 0.0);
    assert_eq!(last["chemical"]["status"], "depleted");
}
