//! キットAPI

use super::error::AppError;
use crate::auth::middleware::require_role;
use crate::common::auth::{Claims, UserRole};
use crate::common::error::TrackerError;
use crate::common::types::{Kit, KitItem};
use crate::custody::{actions, CustodyEvent};
use crate::db::kits::{NewKit, NewKitItem};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::json;

/// GET /api/kits - キット一覧（構成品なし）
pub async fn list_kits(State(app_state): State<AppState>) -> Result<Json<Vec<Kit>>, AppError> {
    Ok(Json(crate::db::kits::list(&app_state.db_pool).await?))
}

/// GET /api/kits/:id - 構成品を含むキット
pub async fn get_kit(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Kit>, AppError> {
    let mut conn = app_state
        .db_pool
        .acquire()
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to acquire connection: {}", e)))?;
    let kit = crate::db::kits::find_by_id(&mut conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("kit {}", id)))?;
    Ok(Json(kit))
}

/// POST /api/kits - キット作成（Admin）
pub async fn create_kit(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Json(input): Json<NewKit>,
) -> Result<(StatusCode, Json<Kit>), AppError> {
    require_role(&claims, UserRole::Admin)?;
    if input.name.trim().is_empty() {
        return Err(TrackerError::validation("Kit name must not be empty").into());
    }

    let mut tx = app_state.custody.begin().await?;
    let kit = crate::db::kits::create(&mut tx, &input).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::KIT_CREATE, "kit", kit.id)
            .with_detail(json!({"name": kit.name, "aircraft_type": kit.aircraft_type})),
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(kit)))
}

/// POST /api/kits/:id/items - 構成品の追加（Admin）
pub async fn add_kit_item(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(kit_id): Path<i64>,
    Json(input): Json<NewKitItem>,
) -> Result<(StatusCode, Json<KitItem>), AppError> {
    require_role(&claims, UserRole::Admin)?;

    let mut tx = app_state.custody.begin().await?;
    let item = crate::db::kits::add_item(&mut tx, kit_id, &input).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::KIT_ITEM_ADD, "kit", kit_id).with_detail(
            json!({
                "kit_item_id": item.id,
                "item_type": item.item_type,
                "item_id": item.item_id,
                "quantity": item.quantity,
            }),
        ),
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// DELETE /api/kits/:id/items/:item_id - 構成品の削除（Admin）
pub async fn remove_kit_item(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path((kit_id, item_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    require_role(&claims, UserRole::Admin)?;

    let mut tx = app_state.custody.begin().await?;
    let item = crate::db::kits::remove_item(&mut tx, kit_id, item_id).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::KIT_ITEM_REMOVE, "kit", kit_id).with_detail(
            json!({
                "kit_item_id": item.id,
                "item_type": item.item_type,
                "item_id": item.item_id,
            }),
        ),
    )
    .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
