//! 工具テーブル

use crate::common::error::{TrackerError, TrackerResult};
use crate::common::types::{Tool, ToolStatus};
use crate::db::{format_date, format_timestamp, now, parse_optional_date, parse_timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqliteExecutor};

const TOOL_COLUMNS: &str = "id, tool_number, serial_number, description, category, location, \
     condition, status, calibration_due, created_at, updated_at";

/// 工具登録の入力
#[derive(Debug, Clone, Deserialize)]
pub struct NewTool {
    /// 管理番号
    pub tool_number: String,
    /// シリアル番号
    #[serde(default)]
    pub serial_number: Option<String>,
    /// 説明
    pub description: String,
    /// 分類
    #[serde(default)]
    pub category: Option<String>,
    /// 保管場所
    #[serde(default)]
    pub location: Option<String>,
    /// 状態メモ
    #[serde(default)]
    pub condition: Option<String>,
    /// 次回校正期限
    #[serde(default)]
    pub calibration_due: Option<NaiveDate>,
}

/// 工具更新の入力（Noneは変更なし）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolUpdate {
    /// シリアル番号
    pub serial_number: Option<String>,
    /// 説明
    pub description: Option<String>,
    /// 分類
    pub category: Option<String>,
    /// 保管場所
    pub location: Option<String>,
    /// 状態メモ
    pub condition: Option<String>,
    /// 次回校正期限
    pub calibration_due: Option<NaiveDate>,
}

/// 工具一覧のフィルタ
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolFilter {
    /// 状態
    pub status: Option<ToolStatus>,
    /// 分類
    pub category: Option<String>,
    /// 管理番号・シリアル・説明の部分一致
    pub search: Option<String>,
}

/// 工具を登録（状態は`available`）
pub async fn create(conn: &mut SqliteConnection, input: &NewTool) -> TrackerResult<Tool> {
    if input.tool_number.trim().is_empty() {
        return Err(TrackerError::validation("tool_number must not be empty"));
    }
    if input.description.trim().is_empty() {
        return Err(TrackerError::validation("description must not be empty"));
    }

    let ts = now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO tools (tool_number, serial_number, description, category, location, condition,
                            status, calibration_due, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 'available', ?, ?, ?)
         RETURNING id",
    )
    .bind(input.tool_number.trim())
    .bind(&input.serial_number)
    .bind(&input.description)
    .bind(&input.category)
    .bind(&input.location)
    .bind(&input.condition)
    .bind(input.calibration_due.as_ref().map(format_date))
    .bind(format_timestamp(&ts))
    .bind(format_timestamp(&ts))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| TrackerError::from_sqlx(&format!("Tool number '{}'", input.tool_number), e))?;

    Ok(Tool {
        id,
        tool_number: input.tool_number.trim().to_string(),
        serial_number: input.serial_number.clone(),
        description: input.description.clone(),
        category: input.category.clone(),
        location: input.location.clone(),
        condition: input.condition.clone(),
        status: ToolStatus::Available,
        calibration_due: input.calibration_due,
        created_at: ts,
        updated_at: ts,
    })
}

/// IDで工具を取得
pub async fn find_by_id<'e, E>(executor: E, id: i64) -> TrackerResult<Option<Tool>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, ToolRow>(&format!("SELECT {TOOL_COLUMNS} FROM tools WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to find tool: {}", e)))?;

    row.map(Tool::try_from).transpose()
}

/// 工具一覧（管理番号順）
pub async fn list<'e, E>(executor: E, filter: &ToolFilter) -> TrackerResult<Vec<Tool>>
where
    E: SqliteExecutor<'e>,
{
    let mut conditions: Vec<&str> = Vec::new();
    let mut bind_values: Vec<String> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("status = ?");
        bind_values.push(status.as_str().to_string());
    }
    if let Some(ref category) = filter.category {
        conditions.push("category = ?");
        bind_values.push(category.clone());
    }
    if let Some(ref search) = filter.search {
        conditions.push("(tool_number LIKE ? OR serial_number LIKE ? OR description LIKE ?)");
        let pattern = format!("%{}%", search);
        bind_values.extend(std::iter::repeat(pattern).take(3));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!("SELECT {TOOL_COLUMNS} FROM tools {where_clause} ORDER BY tool_number ASC");

    let mut query = sqlx::query_as::<_, ToolRow>(&sql);
    for val in &bind_values {
        query = query.bind(val.as_str());
    }

    let rows = query
        .fetch_all(executor)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to list tools: {}", e)))?;

    rows.into_iter().map(Tool::try_from).collect()
}

/// 工具の属性を更新
///
/// 廃棄済みの工具は変更できない。
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    changes: &ToolUpdate,
) -> TrackerResult<Tool> {
    let current = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("tool {}", id)))?;
    if current.status == ToolStatus::Retired {
        return Err(TrackerError::InvalidTransition(format!(
            "Tool {} is retired",
            current.tool_number
        )));
    }
    if changes
        .description
        .as_deref()
        .is_some_and(|d| d.trim().is_empty())
    {
        return Err(TrackerError::validation("description must not be empty"));
    }

    let updated = Tool {
        serial_number: changes.serial_number.clone().or(current.serial_number),
        description: changes.description.clone().unwrap_or(current.description),
        category: changes.category.clone().or(current.category),
        location: changes.location.clone().or(current.location),
        condition: changes.condition.clone().or(current.condition),
        calibration_due: changes.calibration_due.or(current.calibration_due),
        updated_at: now(),
        ..current
    };

    sqlx::query(
        "UPDATE tools SET serial_number = ?, description = ?, category = ?, location = ?,
                          condition = ?, calibration_due = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&updated.serial_number)
    .bind(&updated.description)
    .bind(&updated.category)
    .bind(&updated.location)
    .bind(&updated.condition)
    .bind(updated.calibration_due.as_ref().map(format_date))
    .bind(format_timestamp(&updated.updated_at))
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to update tool: {}", e)))?;

    Ok(updated)
}

/// 手動で状態を変更する
///
/// 遷移規則は`ToolStatus::can_transition_to`に従う。読み出しと更新の間に
/// 状態が変わっていた場合は`Conflict`を返す。
///
/// # Returns
/// * `Ok((previous, tool))` - 変更前の状態と変更後の工具
pub async fn set_status(
    conn: &mut SqliteConnection,
    id: i64,
    next: ToolStatus,
) -> TrackerResult<(ToolStatus, Tool)> {
    let current = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("tool {}", id)))?;

    if !current.status.can_transition_to(next) {
        return Err(TrackerError::InvalidTransition(format!(
            "Tool {} cannot move from {} to {}",
            current.tool_number, current.status, next
        )));
    }

    if !swap_status(&mut *conn, id, current.status, next).await? {
        return Err(TrackerError::Conflict(format!(
            "Tool {} changed concurrently",
            current.tool_number
        )));
    }

    let previous = current.status;
    let tool = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("tool {}", id)))?;
    Ok((previous, tool))
}

/// 状態が`from`のときだけ`to`へ書き換える
///
/// # Returns
/// * `Ok(true)` - 更新した
/// * `Ok(false)` - 現在の状態が`from`ではなかった
pub(crate) async fn swap_status(
    conn: &mut SqliteConnection,
    id: i64,
    from: ToolStatus,
    to: ToolStatus,
) -> TrackerResult<bool> {
    let result = sqlx::query("UPDATE tools SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(format_timestamp(&now()))
        .bind(id)
        .bind(from.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to update tool status: {}", e)))?;

    Ok(result.rows_affected() == 1)
}

#[derive(sqlx::FromRow)]
struct ToolRow {
    id: i64,
    tool_number: String,
    serial_number: Option<String>,
    description: String,
    category: Option<String>,
    location: Option<String>,
    condition: Option<String>,
    status: String,
    calibration_due: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ToolRow> for Tool {
    type Error = TrackerError;

    fn try_from(row: ToolRow) -> Result<Self, Self::Error> {
        let status = ToolStatus::parse(&row.status)
            .ok_or_else(|| TrackerError::Database(format!("Invalid tool status: {}", row.status)))?;
        Ok(Tool {
            id: row.id,
            tool_number: row.tool_number,
            serial_number: row.serial_number,
            description: row.description,
            category: row.category,
            location: row.location,
            condition: row.condition,
            status,
            calibration_due: parse_optional_date("calibration_due", row.calibration_due.as_deref())?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}
