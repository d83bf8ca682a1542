//! 契約テスト共通ヘルパー

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use mrotrack::common::auth::UserRole;
use mrotrack::config::StorageConfig;
use mrotrack::db::migrations::initialize_database;
use mrotrack::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// テストユーザー共通のパスワード
pub const TEST_PASSWORD: &str = "password123";

/// テスト用JWT秘密鍵
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

/// テスト用のアプリケーション
pub struct TestApp {
    /// ルーター
    pub app: Router,
    /// 状態（DB直接確認用）
    pub state: AppState,
    /// DBファイルとバックアップ出力先を含む一時ディレクトリ
    pub dir: TempDir,
}

/// 一時ディレクトリのDBファイル上にアプリを組み立て、`admin`ユーザーを作る
pub async fn create_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!("sqlite:{}", dir.path().join("mrotrack.db").display());
    let db_pool = initialize_database(&database_url).await.unwrap();
    let storage = StorageConfig {
        data_dir: dir.path().to_path_buf(),
        database_url,
        backup_dir: dir.path().join("backups"),
    };
    let state = AppState::new(db_pool, TEST_JWT_SECRET.to_string(), storage);
    create_user(&state, "admin", UserRole::Admin).await;
    let app = mrotrack::api::create_app(state.clone());
    TestApp { app, state, dir }
}

/// DBに直接ユーザーを作る（ハッシュは低コスト）
pub async fn create_user(state: &AppState, username: &str, role: UserRole) -> Uuid {
    let hash = bcrypt::hash(TEST_PASSWORD, 4).unwrap();
    let mut conn = state.db_pool.acquire().await.unwrap();
    mrotrack::db::users::create(&mut conn, username, &hash, role, false)
        .await
        .unwrap()
        .id
}

/// リクエストを送ってレスポンスをそのまま返す
pub async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

/// リクエストを送ってステータスとJSONボディを返す（空ならNull）
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send_raw(app, method, uri, token, body).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// ログインしてステータスとボディを返す
pub async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"username": username, "password": password})),
    )
    .await
}

/// ログインしてトークンを返す
pub async fn login_token(app: &Router, username: &str) -> String {
    let (status, body) = login(app, username, TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "login failed for {}: {}", username, body);
    body["token"].as_str().unwrap().to_string()
}

/// 工具を登録してIDを返す
pub async fn create_tool(app: &Router, admin_token: &str, tool_number: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/tools",
        Some(admin_token),
        Some(json!({
            "tool_number": tool_number,
            "description": "Torque wrench 20-100 Nm",
            "location": "Crib A",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

/// カストディログのエントリ数
pub async fn custody_total(app: &Router, token: &str) -> i64 {
    let (status, body) = send(app, "GET", "/api/custody/entries", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["total"].as_i64().unwrap()
}
