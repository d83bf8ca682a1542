//! 工具の貸出・返却API

use super::auth::subject_id;
use super::error::AppError;
use crate::auth::middleware::require_role;
use crate::common::auth::{Claims, UserRole};
use crate::common::error::TrackerError;
use crate::common::types::{Checkout, Tool};
use crate::custody::{actions, CustodyEvent};
use crate::db::checkouts::CheckoutFilter;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// 貸出リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// 工具ID
    pub tool_id: i64,
    /// 借り手（省略時は自分。他人名義はAdminのみ）
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// 返却予定日
    #[serde(default)]
    pub expected_return_date: Option<NaiveDate>,
    /// 備考
    #[serde(default)]
    pub notes: Option<String>,
}

/// 返却リクエスト
#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequest {
    /// 返却時の状態（"damaged"なら工具は保守へ）
    #[serde(default)]
    pub condition: Option<String>,
    /// 備考
    #[serde(default)]
    pub notes: Option<String>,
}

/// 貸出・返却のレスポンス
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// 貸出記録
    pub checkout: Checkout,
    /// 操作後の工具
    pub tool: Tool,
}

/// GET /api/checkouts - 貸出一覧（active / overdue / tool_id / user_id）
pub async fn list_checkouts(
    State(app_state): State<AppState>,
    Query(filter): Query<CheckoutFilter>,
) -> Result<Json<Vec<Checkout>>, AppError> {
    Ok(Json(
        crate::db::checkouts::list(&app_state.db_pool, &filter).await?,
    ))
}

/// GET /api/checkouts/:id
pub async fn get_checkout(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Checkout>, AppError> {
    let checkout = crate::db::checkouts::find_by_id(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("checkout {}", id)))?;
    Ok(Json(checkout))
}

/// POST /api/checkouts - 工具を貸し出す（Technician以上）
///
/// # Returns
/// * `201 Created` - 貸出記録と`checked_out`になった工具
/// * `409 Conflict` - 工具が貸出可能ではない
pub async fn create_checkout(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    require_role(&claims, UserRole::Technician)?;
    let me = subject_id(&claims)?;
    let borrower = match request.user_id {
        Some(user_id) if user_id != me => {
            require_role(&claims, UserRole::Admin)?;
            user_id
        }
        _ => me,
    };

    let mut tx = app_state.custody.begin().await?;
    let borrower_name = crate::db::users::find_by_id(&mut *tx, borrower)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("user {}", borrower)))?
        .username;
    let (checkout, tool) = crate::db::checkouts::create(
        &mut tx,
        request.tool_id,
        borrower,
        request.expected_return_date,
        request.notes.as_deref(),
    )
    .await?;
    tx.append(
        CustodyEvent::new(
            &claims.username,
            actions::CHECKOUT_CREATE,
            "checkout",
            checkout.id,
        )
        .with_detail(json!({
            "tool_id": tool.id,
            "tool_number": tool.tool_number,
            "user": borrower_name,
            "expected_return_date": checkout.expected_return_date,
        })),
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse { checkout, tool })))
}

/// POST /api/checkouts/:id/return - 工具を返却する（Technician以上）
pub async fn return_checkout(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    request: Option<Json<ReturnRequest>>,
) -> Result<Json<CheckoutResponse>, AppError> {
    require_role(&claims, UserRole::Technician)?;
    let Json(request) = request.unwrap_or_default();

    let mut tx = app_state.custody.begin().await?;
    let (checkout, tool) = crate::db::checkouts::return_tool(
        &mut tx,
        id,
        request.condition.as_deref(),
        request.notes.as_deref(),
    )
    .await?;
    tx.append(
        CustodyEvent::new(
            &claims.username,
            actions::CHECKOUT_RETURN,
            "checkout",
            checkout.id,
        )
        .with_detail(json!({
            "tool_id": tool.id,
            "tool_number": tool.tool_number,
            "condition": checkout.return_condition,
            "tool_status": tool.status,
        })),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(CheckoutResponse { checkout, tool }))
}
