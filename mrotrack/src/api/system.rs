//! System API (health / version).

use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    name: &'static str,
    version: &'static str,
    pid: u32,
    custody_entries: i64,
    custody_head_seq: Option<i64>,
}

/// GET /health
///
/// データベースに届かなければ503。
pub async fn health(State(state): State<AppState>) -> Response {
    match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => Json(HealthResponse {
            status: "ok",
            database: "ok",
        })
        .into_response(),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
                .into_response()
        }
    }
}

/// GET /api/system/version
pub async fn version(State(state): State<AppState>) -> Result<Response, super::error::AppError> {
    let storage = state.custody.storage();
    let custody_entries = storage.count().await?;
    let custody_head_seq = storage.head().await?.map(|h| h.seq);
    Ok(Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        pid: std::process::id(),
        custody_entries,
        custody_head_seq,
    })
    .into_response())
}
