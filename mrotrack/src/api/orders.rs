//! 調達依頼API

use super::auth::subject_id;
use super::error::AppError;
use crate::auth::middleware::require_role;
use crate::common::auth::{Claims, UserRole};
use crate::common::error::TrackerError;
use crate::common::types::{OrderStatus, ProcurementOrder};
use crate::custody::{actions, CustodyEvent};
use crate::db::orders::{NewOrder, OrderTransition};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

/// 一覧の絞り込み
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    /// 状態
    pub status: Option<OrderStatus>,
}

/// 状態変更リクエスト
#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    /// 変更後の状態
    pub status: OrderStatus,
    /// 仕入先・追跡番号・備考
    #[serde(flatten)]
    pub extra: OrderTransition,
}

/// GET /api/orders
pub async fn list_orders(
    State(app_state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<ProcurementOrder>>, AppError> {
    Ok(Json(
        crate::db::orders::list(&app_state.db_pool, query.status).await?,
    ))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProcurementOrder>, AppError> {
    let order = crate::db::orders::find_by_id(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("order {}", id)))?;
    Ok(Json(order))
}

/// POST /api/orders - 調達依頼の起票（Technician以上）
pub async fn create_order(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Json(input): Json<NewOrder>,
) -> Result<(StatusCode, Json<ProcurementOrder>), AppError> {
    require_role(&claims, UserRole::Technician)?;
    let requested_by = subject_id(&claims)?;

    let mut tx = app_state.custody.begin().await?;
    let order = crate::db::orders::create(&mut tx, &input, requested_by).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::ORDER_CREATE, "order", order.id).with_detail(
            json!({
                "title": order.title,
                "order_type": order.order_type,
                "part_number": order.part_number,
                "quantity": order.quantity,
                "priority": order.priority,
            }),
        ),
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// PUT /api/orders/:id/status - 調達依頼の状態変更（Admin）
///
/// # Returns
/// * `200 OK` - 変更後のオーダー
/// * `409 Conflict` - 許されない遷移
pub async fn set_order_status(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<OrderStatusRequest>,
) -> Result<Json<ProcurementOrder>, AppError> {
    require_role(&claims, UserRole::Admin)?;

    let mut tx = app_state.custody.begin().await?;
    let (previous, order) =
        crate::db::orders::transition(&mut tx, id, request.status, &request.extra).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::ORDER_STATUS, "order", order.id).with_detail(
            json!({
                "from": previous,
                "to": order.status,
                "vendor": order.vendor,
                "tracking_number": order.tracking_number,
            }),
        ),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(order))
}
