//! カストディログAPI
//!
//! 閲覧、チェーン検証、CSV配信、バックアップ作成

use super::error::AppError;
use crate::auth::middleware::require_role;
use crate::common::auth::{Claims, UserRole};
use crate::custody::backup::{create_backup, BackupManifest};
use crate::custody::export::{export_custody_log, CUSTODY_LOG_FILE};
use crate::custody::{actions, ChainVerificationResult, CustodyEntry, CustodyEvent, CustodyFilter};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

/// エントリ一覧レスポンス
#[derive(Debug, Serialize)]
pub struct CustodyPage {
    /// エントリ（新しい順）
    pub entries: Vec<CustodyEntry>,
    /// 条件に一致する総件数
    pub total: i64,
    /// ページ番号（1始まり）
    pub page: i64,
    /// 1ページの件数
    pub per_page: i64,
}

/// GET /api/custody/entries - カストディログの検索
pub async fn list_entries(
    State(app_state): State<AppState>,
    Query(filter): Query<CustodyFilter>,
) -> Result<Json<CustodyPage>, AppError> {
    let storage = app_state.custody.storage();
    let entries = storage.query(&filter).await?;
    let total = storage.count_filtered(&filter).await?;
    Ok(Json(CustodyPage {
        entries,
        total,
        page: filter.page.unwrap_or(1).max(1),
        per_page: filter.per_page.unwrap_or(50).clamp(1, 500),
    }))
}

/// POST /api/custody/verify - チェーン全体の検証
pub async fn verify(
    State(app_state): State<AppState>,
) -> Result<Json<ChainVerificationResult>, AppError> {
    let result = app_state.custody.verify().await?;
    if !result.valid {
        tracing::error!(
            first_invalid_seq = ?result.first_invalid_seq,
            message = ?result.message,
            "Custody chain verification FAILED"
        );
    }
    Ok(Json(result))
}

/// GET /api/custody/export.csv - カストディログのCSV（Admin）
///
/// チェーンが検証できないときは500（integrity_error）で拒否する。
/// 配信した事実は`custody.export`として記録する。
pub async fn export_csv(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    require_role(&claims, UserRole::Admin)?;

    let (csv, rows) = export_custody_log(&app_state.db_pool).await?;
    let digest = crate::custody::sha256_hex(&csv);
    app_state
        .custody
        .append(
            CustodyEvent::new(&claims.username, actions::CUSTODY_EXPORT, "custody_log", "csv")
                .with_detail(json!({"rows": rows, "sha256": digest})),
        )
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CUSTODY_LOG_FILE),
            ),
            (header::HeaderName::from_static("x-content-sha256"), digest),
        ],
        csv,
    )
        .into_response())
}

/// POST /api/custody/backup - SQLiteバックアップの作成（Admin）
///
/// 出力先は`MROTRACK_BACKUP_DIR`配下の`mrotrack-<timestamp>.db`。
pub async fn backup(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
) -> Result<(StatusCode, Json<BackupManifest>), AppError> {
    require_role(&claims, UserRole::Admin)?;

    let file_name = format!("mrotrack-{}.db", Utc::now().format("%Y%m%dT%H%M%S%6fZ"));
    let dest = app_state.storage.backup_dir.join(file_name);
    let manifest = create_backup(&app_state.db_pool, &dest).await?;

    app_state
        .custody
        .append(
            CustodyEvent::new(&claims.username, actions::CUSTODY_BACKUP, "backup", &manifest.file_name)
                .with_detail(json!({
                    "sha256": manifest.sha256,
                    "bytes": manifest.bytes,
                    "head_seq": manifest.head_seq,
                    "chain_valid": manifest.chain_valid,
                })),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(manifest)))
}
