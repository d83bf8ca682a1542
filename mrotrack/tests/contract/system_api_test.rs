//! System API Contract Tests

use crate::support::{create_test_app, login_token, send};
use axum::http::StatusCode;

#[tokio::test]
async fn test_health_is_public() {
    let t = create_test_app().await;
    let (status, body) = send(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_version_requires_auth_and_reports_head() {
    let t = create_test_app().await;
    let (status, _) = send(&t.app, "GET", "/api/system/version", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login_token(&t.app, "admin").await;
    let (status, body) = send(&t.app, "GET", "/api/system/version", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "mrotrack");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["custody_entries"], 1);
    assert_eq!(body["custody_head_seq"], 1);
}
