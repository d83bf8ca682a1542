//! 調達オーダー

use crate::common::error::{TrackerError, TrackerResult};
use crate::common::types::{OrderPriority, OrderStatus, OrderType, ProcurementOrder};
use crate::db::{
    format_date, format_timestamp, now, parse_optional_date, parse_optional_timestamp,
    parse_timestamp, parse_uuid,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqliteExecutor};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, title, order_type, part_number, description, quantity, unit, \
     priority, status, requested_by, needed_by, vendor, tracking_number, notes, created_at, \
     ordered_at, received_at, updated_at";

/// オーダー起票の入力
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    /// 件名
    pub title: String,
    /// 種別
    pub order_type: OrderType,
    /// 部品番号
    #[serde(default)]
    pub part_number: Option<String>,
    /// 説明
    #[serde(default)]
    pub description: Option<String>,
    /// 数量
    pub quantity: f64,
    /// 単位
    #[serde(default)]
    pub unit: Option<String>,
    /// 優先度
    #[serde(default)]
    pub priority: OrderPriority,
    /// 必要日
    #[serde(default)]
    pub needed_by: Option<NaiveDate>,
    /// 備考
    #[serde(default)]
    pub notes: Option<String>,
}

/// 状態遷移と同時に記録する付帯情報
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderTransition {
    /// 仕入先
    pub vendor: Option<String>,
    /// 追跡番号
    pub tracking_number: Option<String>,
    /// 備考
    pub notes: Option<String>,
}

/// オーダーを起票（状態は`new`）
pub async fn create(
    conn: &mut SqliteConnection,
    input: &NewOrder,
    requested_by: Uuid,
) -> TrackerResult<ProcurementOrder> {
    if input.title.trim().is_empty() {
        return Err(TrackerError::validation("title must not be empty"));
    }
    if !input.quantity.is_finite() || input.quantity <= 0.0 {
        return Err(TrackerError::validation("quantity must be positive"));
    }

    let ts = format_timestamp(&now());
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO procurement_orders (title, order_type, part_number, description, quantity, unit,
                                         priority, status, requested_by, needed_by, notes,
                                         created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'new', ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(input.title.trim())
    .bind(input.order_type.as_str())
    .bind(&input.part_number)
    .bind(&input.description)
    .bind(input.quantity)
    .bind(&input.unit)
    .bind(input.priority.as_str())
    .bind(requested_by.to_string())
    .bind(input.needed_by.as_ref().map(format_date))
    .bind(&input.notes)
    .bind(&ts)
    .bind(&ts)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| TrackerError::from_sqlx("Procurement order", e))?;

    find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::Internal(format!("order {} vanished after insert", id)))
}

/// IDでオーダーを取得
pub async fn find_by_id<'e, E>(executor: E, id: i64) -> TrackerResult<Option<ProcurementOrder>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM procurement_orders WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to find order: {}", e)))?;

    row.map(ProcurementOrder::try_from).transpose()
}

/// オーダー一覧（新しい順）
pub async fn list<'e, E>(
    executor: E,
    status: Option<OrderStatus>,
) -> TrackerResult<Vec<ProcurementOrder>>
where
    E: SqliteExecutor<'e>,
{
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {ORDER_COLUMNS} FROM procurement_orders WHERE status = ? ORDER BY id DESC"
            ))
            .bind(status.as_str())
            .fetch_all(executor)
            .await
        }
        None => {
            sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {ORDER_COLUMNS} FROM procurement_orders ORDER BY id DESC"
            ))
            .fetch_all(executor)
            .await
        }
    }
    .map_err(|e| TrackerError::Database(format!("Failed to list orders: {}", e)))?;

    rows.into_iter().map(ProcurementOrder::try_from).collect()
}

/// オーダーの状態を遷移させる
///
/// 遷移規則は`OrderStatus::can_transition_to`に従う。`ordered`で`ordered_at`、
/// `received`で`received_at`を記録する。
///
/// # Returns
/// * `Ok((previous, order))` - 遷移前の状態と遷移後のオーダー
/// * `Err(TrackerError::InvalidTransition)` - 許可されない遷移
pub async fn transition(
    conn: &mut SqliteConnection,
    id: i64,
    next: OrderStatus,
    extra: &OrderTransition,
) -> TrackerResult<(OrderStatus, ProcurementOrder)> {
    let current = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("order {}", id)))?;

    if !current.status.can_transition_to(next) {
        return Err(TrackerError::InvalidTransition(format!(
            "Order {} cannot move from {} to {}",
            id, current.status, next
        )));
    }

    let ts = format_timestamp(&now());
    let ordered_at = (next == OrderStatus::Ordered).then(|| ts.clone());
    let received_at = (next == OrderStatus::Received).then(|| ts.clone());

    let result = sqlx::query(
        "UPDATE procurement_orders
         SET status = ?,
             vendor = COALESCE(?, vendor),
             tracking_number = COALESCE(?, tracking_number),
             notes = COALESCE(?, notes),
             ordered_at = COALESCE(?, ordered_at),
             received_at = COALESCE(?, received_at),
             updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(next.as_str())
    .bind(&extra.vendor)
    .bind(&extra.tracking_number)
    .bind(&extra.notes)
    .bind(ordered_at)
    .bind(received_at)
    .bind(&ts)
    .bind(id)
    .bind(current.status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to update order: {}", e)))?;

    if result.rows_affected() == 0 {
        return Err(TrackerError::Conflict(format!(
            "Order {} changed concurrently",
            id
        )));
    }

    let order = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("order {}", id)))?;
    Ok((current.status, order))
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    title: String,
    order_type: String,
    part_number: Option<String>,
    description: Option<String>,
    quantity: f64,
    unit: Option<String>,
    priority: String,
    status: String,
    requested_by: String,
    needed_by: Option<String>,
    vendor: Option<String>,
    tracking_number: Option<String>,
    notes: Option<String>,
    created_at: String,
    ordered_at: Option<String>,
    received_at: Option<String>,
    updated_at: String,
}

impl TryFrom<OrderRow> for ProcurementOrder {
    type Error = TrackerError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let order_type = OrderType::parse(&row.order_type).ok_or_else(|| {
            TrackerError::Database(format!("Invalid order type: {}", row.order_type))
        })?;
        let priority = OrderPriority::parse(&row.priority).ok_or_else(|| {
            TrackerError::Database(format!("Invalid order priority: {}", row.priority))
        })?;
        let status = OrderStatus::parse(&row.status)
            .ok_or_else(|| TrackerError::Database(format!("Invalid order status: {}", row.status)))?;

        Ok(ProcurementOrder {
            id: row.id,
            title: row.title,
            order_type,
            part_number: row.part_number,
            description: row.description,
            quantity: row.quantity,
            unit: row.unit,
            priority,
            status,
            requested_by: parse_uuid("requested_by", &row.requested_by)?,
            needed_by: parse_optional_date("needed_by", row.needed_by.as_deref())?,
            vendor: row.vendor,
            tracking_number: row.tracking_number,
            notes: row.notes,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            ordered_at: parse_optional_timestamp("ordered_at", row.ordered_at.as_deref())?,
            received_at: parse_optional_timestamp("received_at", row.received_at.as_deref())?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}
