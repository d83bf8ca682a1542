//! 工具の貸出・返却

use crate::common::error::{TrackerError, TrackerResult};
use crate::common::types::{Checkout, Tool, ToolStatus};
use crate::db::{
    format_date, format_timestamp, now, parse_optional_date, parse_optional_timestamp,
    parse_timestamp, parse_uuid, tools,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqliteExecutor};
use uuid::Uuid;

const CHECKOUT_COLUMNS: &str = "id, tool_id, user_id, checked_out_at, expected_return_date, \
     returned_at, return_condition, notes";

/// 返却時に工具を整備へ回す状態
pub const DAMAGED_CONDITION: &str = "damaged";

/// 貸出一覧のフィルタ
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutFilter {
    /// 未返却のみ（true）／返却済みのみ（false）
    pub active: Option<bool>,
    /// 返却予定日超過のみ
    pub overdue: Option<bool>,
    /// 工具
    pub tool_id: Option<i64>,
    /// 借用者
    pub user_id: Option<Uuid>,
}

/// 工具を貸し出す
///
/// 工具が`available`であることを条件付きUPDATEで確認し`checked_out`へ変更する。
/// 未返却の貸出は部分ユニークインデックスにより工具ごとに1件まで。
///
/// # Returns
/// * `Ok((Checkout, Tool))` - 作成された貸出と更新後の工具
/// * `Err(TrackerError::Conflict)` - 工具が貸出可能ではない
pub async fn create(
    conn: &mut SqliteConnection,
    tool_id: i64,
    user_id: Uuid,
    expected_return_date: Option<NaiveDate>,
    notes: Option<&str>,
) -> TrackerResult<(Checkout, Tool)> {
    let tool = tools::find_by_id(&mut *conn, tool_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("tool {}", tool_id)))?;

    if tool.status != ToolStatus::Available
        || !tools::swap_status(&mut *conn, tool_id, ToolStatus::Available, ToolStatus::CheckedOut)
            .await?
    {
        return Err(TrackerError::Conflict(format!(
            "Tool {} is not available (status: {})",
            tool.tool_number, tool.status
        )));
    }

    let checked_out_at = now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO checkouts (tool_id, user_id, checked_out_at, expected_return_date, notes)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(tool_id)
    .bind(user_id.to_string())
    .bind(format_timestamp(&checked_out_at))
    .bind(expected_return_date.as_ref().map(format_date))
    .bind(notes)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| TrackerError::from_sqlx(&format!("Open checkout for tool {}", tool.tool_number), e))?;

    let tool = tools::find_by_id(&mut *conn, tool_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("tool {}", tool_id)))?;

    Ok((
        Checkout {
            id,
            tool_id,
            user_id,
            checked_out_at,
            expected_return_date,
            returned_at: None,
            return_condition: None,
            notes: notes.map(str::to_string),
        },
        tool,
    ))
}

/// 工具を返却する
///
/// 返却状態が`damaged`なら工具は`maintenance`、それ以外は`available`に戻る。
///
/// # Returns
/// * `Ok((Checkout, Tool))` - 返却済みの貸出と更新後の工具
/// * `Err(TrackerError::Conflict)` - 既に返却済み
pub async fn return_tool(
    conn: &mut SqliteConnection,
    checkout_id: i64,
    condition: Option<&str>,
    notes: Option<&str>,
) -> TrackerResult<(Checkout, Tool)> {
    let checkout = find_by_id(&mut *conn, checkout_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("checkout {}", checkout_id)))?;

    let returned_at = now();
    let result = sqlx::query(
        "UPDATE checkouts SET returned_at = ?, return_condition = ?, notes = COALESCE(?, notes)
         WHERE id = ? AND returned_at IS NULL",
    )
    .bind(format_timestamp(&returned_at))
    .bind(condition)
    .bind(notes)
    .bind(checkout_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to return checkout: {}", e)))?;

    if result.rows_affected() == 0 {
        return Err(TrackerError::Conflict(format!(
            "Checkout {} is already returned",
            checkout_id
        )));
    }

    let next = if condition.is_some_and(|c| c.eq_ignore_ascii_case(DAMAGED_CONDITION)) {
        ToolStatus::Maintenance
    } else {
        ToolStatus::Available
    };
    if !tools::swap_status(&mut *conn, checkout.tool_id, ToolStatus::CheckedOut, next).await? {
        return Err(TrackerError::Internal(format!(
            "Tool {} was not checked_out while checkout {} was open",
            checkout.tool_id, checkout_id
        )));
    }

    let tool = tools::find_by_id(&mut *conn, checkout.tool_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("tool {}", checkout.tool_id)))?;

    Ok((
        Checkout {
            returned_at: Some(returned_at),
            return_condition: condition.map(str::to_string),
            notes: notes.map(str::to_string).or(checkout.notes),
            ..checkout
        },
        tool,
    ))
}

/// IDで貸出を取得
pub async fn find_by_id<'e, E>(executor: E, id: i64) -> TrackerResult<Option<Checkout>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, CheckoutRow>(&format!(
        "SELECT {CHECKOUT_COLUMNS} FROM checkouts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to find checkout: {}", e)))?;

    row.map(Checkout::try_from).transpose()
}

/// 貸出一覧（新しい順）
pub async fn list<'e, E>(executor: E, filter: &CheckoutFilter) -> TrackerResult<Vec<Checkout>>
where
    E: SqliteExecutor<'e>,
{
    let mut conditions: Vec<&str> = Vec::new();
    let mut bind_values: Vec<String> = Vec::new();

    match filter.active {
        Some(true) => conditions.push("returned_at IS NULL"),
        Some(false) => conditions.push("returned_at IS NOT NULL"),
        None => {}
    }
    if filter.overdue == Some(true) {
        conditions.push("returned_at IS NULL AND expected_return_date < ?");
        bind_values.push(format_date(&Utc::now().date_naive()));
    }
    if let Some(tool_id) = filter.tool_id {
        conditions.push("tool_id = ?");
        bind_values.push(tool_id.to_string());
    }
    if let Some(user_id) = filter.user_id {
        conditions.push("user_id = ?");
        bind_values.push(user_id.to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!("SELECT {CHECKOUT_COLUMNS} FROM checkouts {where_clause} ORDER BY id DESC");

    let mut query = sqlx::query_as::<_, CheckoutRow>(&sql);
    for val in &bind_values {
        query = query.bind(val.as_str());
    }

    let rows = query
        .fetch_all(executor)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to list checkouts: {}", e)))?;

    rows.into_iter().map(Checkout::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct CheckoutRow {
    id: i64,
    tool_id: i64,
    user_id: String,
    checked_out_at: String,
    expected_return_date: Option<String>,
    returned_at: Option<String>,
    return_condition: Option<String>,
    notes: Option<String>,
}

impl TryFrom<CheckoutRow> for Checkout {
    type Error = TrackerError;

    fn try_from(row: CheckoutRow) -> Result<Self, Self::Error> {
        Ok(Checkout {
            id: row.id,
            tool_id: row.tool_id,
            user_id: parse_uuid("user_id", &row.user_id)?,
            checked_out_at: parse_timestamp("checked_out_at", &row.checked_out_at)?,
            expected_return_date: parse_optional_date(
                "expected_return_date",
                row.expected_return_date.as_deref(),
            )?,
            returned_at: parse_optional_timestamp("returned_at", row.returned_at.as_deref())?,
            return_condition: row.return_condition,
            notes: row.notes,
        })
    }
}
