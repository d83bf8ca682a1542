//! 化学品テーブルと払出記録

use crate::common::error::{TrackerError, TrackerResult};
use crate::common::types::{
    round_quantity, Chemical, ChemicalIssuance, ChemicalStatus, QUANTITY_DECIMALS,
};
use crate::db::{
    format_date, format_timestamp, now, parse_optional_date, parse_timestamp, parse_uuid,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqliteExecutor};
use uuid::Uuid;

const CHEMICAL_COLUMNS: &str = "id, part_number, lot_number, description, manufacturer, quantity, \
     unit, location, minimum_stock_level, expiration_date, created_at, updated_at";

/// 化学品登録の入力
#[derive(Debug, Clone, Deserialize)]
pub struct NewChemical {
    /// 部品番号
    pub part_number: String,
    /// ロット番号
    pub lot_number: String,
    /// 説明
    pub description: String,
    /// メーカー
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// 初期数量
    pub quantity: f64,
    /// 単位
    pub unit: String,
    /// 保管場所
    #[serde(default)]
    pub location: Option<String>,
    /// 最低在庫数量
    #[serde(default)]
    pub minimum_stock_level: Option<f64>,
    /// 使用期限
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

/// 化学品更新の入力（Noneは変更なし）
///
/// `quantity`の指定は棚卸し調整として扱う。払出は`issue`を使う。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChemicalUpdate {
    /// 説明
    pub description: Option<String>,
    /// メーカー
    pub manufacturer: Option<String>,
    /// 数量（棚卸し調整）
    pub quantity: Option<f64>,
    /// 保管場所
    pub location: Option<String>,
    /// 最低在庫数量
    pub minimum_stock_level: Option<f64>,
    /// 使用期限
    pub expiration_date: Option<NaiveDate>,
}

/// 化学品一覧のフィルタ
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChemicalFilter {
    /// 導出状態
    pub status: Option<ChemicalStatus>,
    /// 部品番号（完全一致）
    pub part_number: Option<String>,
    /// 部品番号・ロット・説明の部分一致
    pub search: Option<String>,
}

fn validate_quantity(field: &str, value: f64) -> TrackerResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrackerError::validation(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(())
}

/// 化学品を登録
pub async fn create(conn: &mut SqliteConnection, input: &NewChemical) -> TrackerResult<Chemical> {
    if input.part_number.trim().is_empty() || input.lot_number.trim().is_empty() {
        return Err(TrackerError::validation(
            "part_number and lot_number must not be empty",
        ));
    }
    if input.unit.trim().is_empty() {
        return Err(TrackerError::validation("unit must not be empty"));
    }
    validate_quantity("quantity", input.quantity)?;
    if let Some(min) = input.minimum_stock_level {
        validate_quantity("minimum_stock_level", min)?;
    }

    let ts = now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO chemicals (part_number, lot_number, description, manufacturer, quantity, unit,
                                location, minimum_stock_level, expiration_date, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(input.part_number.trim())
    .bind(input.lot_number.trim())
    .bind(&input.description)
    .bind(&input.manufacturer)
    .bind(round_quantity(input.quantity))
    .bind(&input.unit)
    .bind(&input.location)
    .bind(input.minimum_stock_level)
    .bind(input.expiration_date.as_ref().map(format_date))
    .bind(format_timestamp(&ts))
    .bind(format_timestamp(&ts))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        TrackerError::from_sqlx(
            &format!(
                "Chemical {} lot {}",
                input.part_number.trim(),
                input.lot_number.trim()
            ),
            e,
        )
    })?;

    find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::Internal(format!("chemical {} vanished after insert", id)))
}

/// IDで化学品を取得
pub async fn find_by_id<'e, E>(executor: E, id: i64) -> TrackerResult<Option<Chemical>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, ChemicalRow>(&format!(
        "SELECT {CHEMICAL_COLUMNS} FROM chemicals WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to find chemical: {}", e)))?;

    row.map(Chemical::try_from).transpose()
}

/// 化学品一覧（部品番号・ロット順）
///
/// 状態は保存されず読み出し時に導出されるため、状態フィルタは取得後に適用する。
pub async fn list<'e, E>(executor: E, filter: &ChemicalFilter) -> TrackerResult<Vec<Chemical>>
where
    E: SqliteExecutor<'e>,
{
    let mut conditions: Vec<&str> = Vec::new();
    let mut bind_values: Vec<String> = Vec::new();

    if let Some(ref part_number) = filter.part_number {
        conditions.push("part_number = ?");
        bind_values.push(part_number.clone());
    }
    if let Some(ref search) = filter.search {
        conditions.push("(part_number LIKE ? OR lot_number LIKE ? OR description LIKE ?)");
        let pattern = format!("%{}%", search);
        bind_values.extend(std::iter::repeat(pattern).take(3));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT {CHEMICAL_COLUMNS} FROM chemicals {where_clause} ORDER BY part_number ASC, lot_number ASC"
    );

    let mut query = sqlx::query_as::<_, ChemicalRow>(&sql);
    for val in &bind_values {
        query = query.bind(val.as_str());
    }

    let rows = query
        .fetch_all(executor)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to list chemicals: {}", e)))?;

    let chemicals = rows
        .into_iter()
        .map(Chemical::try_from)
        .collect::<TrackerResult<Vec<_>>>()?;

    Ok(match filter.status {
        Some(status) => chemicals.into_iter().filter(|c| c.status == status).collect(),
        None => chemicals,
    })
}

/// 化学品の属性を更新
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    changes: &ChemicalUpdate,
) -> TrackerResult<Chemical> {
    let current = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("chemical {}", id)))?;
    if let Some(quantity) = changes.quantity {
        validate_quantity("quantity", quantity)?;
    }
    if let Some(min) = changes.minimum_stock_level {
        validate_quantity("minimum_stock_level", min)?;
    }

    let description = changes
        .description
        .clone()
        .unwrap_or(current.description);
    let manufacturer = changes.manufacturer.clone().or(current.manufacturer);
    let quantity = round_quantity(changes.quantity.unwrap_or(current.quantity));
    let location = changes.location.clone().or(current.location);
    let minimum_stock_level = changes.minimum_stock_level.or(current.minimum_stock_level);
    let expiration_date = changes.expiration_date.or(current.expiration_date);

    sqlx::query(
        "UPDATE chemicals SET description = ?, manufacturer = ?, quantity = ?, location = ?,
                              minimum_stock_level = ?, expiration_date = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&description)
    .bind(&manufacturer)
    .bind(quantity)
    .bind(&location)
    .bind(minimum_stock_level)
    .bind(expiration_date.as_ref().map(format_date))
    .bind(format_timestamp(&now()))
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to update chemical: {}", e)))?;

    find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("chemical {}", id)))
}

/// 化学品を払い出す
///
/// 在庫の減算は条件付きUPDATE一文で行い、在庫不足と期限切れを拒否する。
/// 数量は`QUANTITY_DECIMALS`桁に丸めて減算・比較する。
///
/// # Returns
/// * `Ok((Chemical, ChemicalIssuance))` - 払出後の化学品と払出記録
/// * `Err(TrackerError::Conflict)` - 在庫不足、または期限切れ
pub async fn issue(
    conn: &mut SqliteConnection,
    id: i64,
    user_id: Uuid,
    quantity: f64,
    purpose: Option<&str>,
) -> TrackerResult<(Chemical, ChemicalIssuance)> {
    if !quantity.is_finite() || round_quantity(quantity) <= 0.0 {
        return Err(TrackerError::validation("quantity must be positive"));
    }
    let quantity = round_quantity(quantity);
    let current = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("chemical {}", id)))?;

    let today = format_date(&Utc::now().date_naive());
    let ts = now();
    let sql = format!(
        "UPDATE chemicals SET quantity = ROUND(quantity - ?, {QUANTITY_DECIMALS}), updated_at = ?
         WHERE id = ? AND ROUND(quantity - ?, {QUANTITY_DECIMALS}) >= 0
           AND (expiration_date IS NULL OR expiration_date >= ?)"
    );
    let result = sqlx::query(&sql)
    .bind(quantity)
    .bind(format_timestamp(&ts))
    .bind(id)
    .bind(quantity)
    .bind(&today)
    .execute(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to issue chemical: {}", e)))?;

    if result.rows_affected() == 0 {
        return Err(if current.status == ChemicalStatus::Expired {
            TrackerError::Conflict(format!(
                "Chemical {} lot {} is expired",
                current.part_number, current.lot_number
            ))
        } else {
            TrackerError::Conflict(format!(
                "Insufficient stock for {} lot {}: requested {}, available {} {}",
                current.part_number, current.lot_number, quantity, current.quantity, current.unit
            ))
        });
    }

    let issuance_id: i64 = sqlx::query_scalar(
        "INSERT INTO chemical_issuances (chemical_id, user_id, quantity, purpose, issued_at)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(id)
    .bind(user_id.to_string())
    .bind(quantity)
    .bind(purpose)
    .bind(format_timestamp(&ts))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| TrackerError::from_sqlx("Chemical issuance", e))?;

    let chemical = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("chemical {}", id)))?;

    Ok((
        chemical,
        ChemicalIssuance {
            id: issuance_id,
            chemical_id: id,
            user_id,
            quantity,
            purpose: purpose.map(str::to_string),
            issued_at: ts,
        },
    ))
}

/// 化学品の払出履歴（新しい順）
pub async fn list_issuances<'e, E>(
    executor: E,
    chemical_id: i64,
) -> TrackerResult<Vec<ChemicalIssuance>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query_as::<_, IssuanceRow>(
        "SELECT id, chemical_id, user_id, quantity, purpose, issued_at
         FROM chemical_issuances WHERE chemical_id = ? ORDER BY id DESC",
    )
    .bind(chemical_id)
    .fetch_all(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to list issuances: {}", e)))?;

    rows.into_iter().map(ChemicalIssuance::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct ChemicalRow {
    id: i64,
    part_number: String,
    lot_number: String,
    description: String,
    manufacturer: Option<String>,
    quantity: f64,
    unit: String,
    location: Option<String>,
    minimum_stock_level: Option<f64>,
    expiration_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ChemicalRow> for Chemical {
    type Error = TrackerError;

    fn try_from(row: ChemicalRow) -> Result<Self, Self::Error> {
        let expiration_date =
            parse_optional_date("expiration_date", row.expiration_date.as_deref())?;
        let status = ChemicalStatus::derive(
            row.quantity,
            row.minimum_stock_level,
            expiration_date,
            Utc::now().date_naive(),
        );
        Ok(Chemical {
            id: row.id,
            part_number: row.part_number,
            lot_number: row.lot_number,
            description: row.description,
            manufacturer: row.manufacturer,
            quantity: row.quantity,
            unit: row.unit,
            location: row.location,
            minimum_stock_level: row.minimum_stock_level,
            expiration_date,
            status,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IssuanceRow {
    id: i64,
    chemical_id: i64,
    user_id: String,
    quantity: f64,
    purpose: Option<String>,
    issued_at: String,
}

impl TryFrom<IssuanceRow> for ChemicalIssuance {
    type Error = TrackerError;

    fn try_from(row: IssuanceRow) -> Result<Self, Self::Error> {
        Ok(ChemicalIssuance {
            id: row.id,
            chemical_id: row.chemical_id,
            user_id: parse_uuid("user_id", &row.user_id)?,
            quantity: row.quantity,
            purpose: row.purpose,
            issued_at: parse_timestamp("issued_at", &row.issued_at)?,
        })
    }
}
