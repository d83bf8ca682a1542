//! 化学品API

use super::auth::subject_id;
use super::error::AppError;
use crate::auth::middleware::require_role;
use crate::common::auth::{Claims, UserRole};
use crate::common::error::TrackerError;
use crate::common::types::{Chemical, ChemicalIssuance};
use crate::custody::{actions, CustodyEvent};
use crate::db::chemicals::{ChemicalFilter, ChemicalUpdate, NewChemical};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// 払出リクエスト
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    /// 払出量（在庫と同じ単位）
    pub quantity: f64,
    /// 用途
    #[serde(default)]
    pub purpose: Option<String>,
}

/// 払出レスポンス
#[derive(Debug, Serialize)]
pub struct IssueResponse {
    /// 払出後の化学品
    pub chemical: Chemical,
    /// 払出記録
    pub issuance: ChemicalIssuance,
}

/// GET /api/chemicals - 化学品一覧（status / part_number / search）
pub async fn list_chemicals(
    State(app_state): State<AppState>,
    Query(filter): Query<ChemicalFilter>,
) -> Result<Json<Vec<Chemical>>, AppError> {
    Ok(Json(
        crate::db::chemicals::list(&app_state.db_pool, &filter).await?,
    ))
}

/// GET /api/chemicals/:id
pub async fn get_chemical(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Chemical>, AppError> {
    let chemical = crate::db::chemicals::find_by_id(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("chemical {}", id)))?;
    Ok(Json(chemical))
}

/// POST /api/chemicals - 化学品ロットの受入（Admin）
pub async fn create_chemical(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Json(input): Json<NewChemical>,
) -> Result<(StatusCode, Json<Chemical>), AppError> {
    require_role(&claims, UserRole::Admin)?;

    let mut tx = app_state.custody.begin().await?;
    let chemical = crate::db::chemicals::create(&mut tx, &input).await?;
    tx.append(
        CustodyEvent::new(
            &claims.username,
            actions::CHEMICAL_CREATE,
            "chemical",
            chemical.id,
        )
        .with_detail(json!({
            "part_number": chemical.part_number,
            "lot_number": chemical.lot_number,
            "quantity": chemical.quantity,
            "unit": chemical.unit,
            "expiration_date": chemical.expiration_date,
        })),
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(chemical)))
}

/// PUT /api/chemicals/:id - 化学品情報の更新（Admin）
///
/// 数量の直接修正（棚卸し）もここで行い、変更前後をカストディログに残す。
pub async fn update_chemical(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<ChemicalUpdate>,
) -> Result<Json<Chemical>, AppError> {
    require_role(&claims, UserRole::Admin)?;

    let mut tx = app_state.custody.begin().await?;
    let before = crate::db::chemicals::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("chemical {}", id)))?;
    let chemical = crate::db::chemicals::update(&mut tx, id, &changes).await?;
    tx.append(
        CustodyEvent::new(
            &claims.username,
            actions::CHEMICAL_UPDATE,
            "chemical",
            chemical.id,
        )
        .with_detail(json!({
            "changes": changes,
            "quantity": {"from": before.quantity, "to": chemical.quantity},
        })),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(chemical))
}

/// POST /api/chemicals/:id/issue - 化学品の払出（Technician以上）
///
/// # Returns
/// * `200 OK` - 払出後の在庫と払出記録
/// * `400 Bad Request` - 数量が正でない
/// * `409 Conflict` - 在庫不足、または期限切れ
pub async fn issue_chemical(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<IssueRequest>,
) -> Result<Json<IssueResponse>, AppError> {
    require_role(&claims, UserRole::Technician)?;
    let user_id = subject_id(&claims)?;

    let mut tx = app_state.custody.begin().await?;
    let (chemical, issuance) = crate::db::chemicals::issue(
        &mut tx,
        id,
        user_id,
        request.quantity,
        request.purpose.as_deref(),
    )
    .await?;
    tx.append(
        CustodyEvent::new(
            &claims.username,
            actions::CHEMICAL_ISSUE,
            "chemical",
            chemical.id,
        )
        .with_detail(json!({
            "issuance_id": issuance.id,
            "lot_number": chemical.lot_number,
            "quantity": issuance.quantity,
            "unit": chemical.unit,
            "remaining": chemical.quantity,
            "purpose": issuance.purpose,
        })),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(IssueResponse { chemical, issuance }))
}

/// GET /api/chemicals/:id/issuances - 払出履歴
pub async fn list_issuances(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ChemicalIssuance>>, AppError> {
    crate::db::chemicals::find_by_id(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("chemical {}", id)))?;
    Ok(Json(
        crate::db::chemicals::list_issuances(&app_state.db_pool, id).await?,
    ))
}
