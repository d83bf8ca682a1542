//! キットと構成品

use crate::common::error::{TrackerError, TrackerResult};
use crate::common::types::{Kit, KitItem, KitItemType};
use crate::db::{format_timestamp, now, parse_timestamp};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqliteExecutor};

/// キット作成の入力
#[derive(Debug, Clone, Deserialize)]
pub struct NewKit {
    /// キット名
    pub name: String,
    /// 対象機種
    #[serde(default)]
    pub aircraft_type: Option<String>,
    /// 説明
    #[serde(default)]
    pub description: Option<String>,
}

/// 構成品追加の入力
#[derive(Debug, Clone, Deserialize)]
pub struct NewKitItem {
    /// 種別
    pub item_type: KitItemType,
    /// 参照先ID
    pub item_id: i64,
    /// 数量（省略時は1）
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// キットを作成
pub async fn create(conn: &mut SqliteConnection, input: &NewKit) -> TrackerResult<Kit> {
    if input.name.trim().is_empty() {
        return Err(TrackerError::validation("kit name must not be empty"));
    }
    let created_at = now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO kits (name, aircraft_type, description, created_at)
         VALUES (?, ?, ?, ?)
         RETURNING id",
    )
    .bind(input.name.trim())
    .bind(&input.aircraft_type)
    .bind(&input.description)
    .bind(format_timestamp(&created_at))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| TrackerError::from_sqlx(&format!("Kit '{}'", input.name.trim()), e))?;

    Ok(Kit {
        id,
        name: input.name.trim().to_string(),
        aircraft_type: input.aircraft_type.clone(),
        description: input.description.clone(),
        created_at,
        items: Vec::new(),
    })
}

/// IDでキットを構成品込みで取得
pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> TrackerResult<Option<Kit>> {
    let row = sqlx::query_as::<_, KitRow>(
        "SELECT id, name, aircraft_type, description, created_at FROM kits WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to find kit: {}", e)))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let items = list_items(&mut *conn, id).await?;
    let mut kit = Kit::try_from(row)?;
    kit.items = items;
    Ok(Some(kit))
}

/// キット一覧（構成品は含まない）
pub async fn list<'e, E>(executor: E) -> TrackerResult<Vec<Kit>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query_as::<_, KitRow>(
        "SELECT id, name, aircraft_type, description, created_at FROM kits ORDER BY name ASC",
    )
    .fetch_all(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to list kits: {}", e)))?;

    rows.into_iter().map(Kit::try_from).collect()
}

/// キットの構成品一覧
pub async fn list_items<'e, E>(executor: E, kit_id: i64) -> TrackerResult<Vec<KitItem>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query_as::<_, KitItemRow>(
        "SELECT id, kit_id, item_type, item_id, quantity, added_at
         FROM kit_items WHERE kit_id = ? ORDER BY id ASC",
    )
    .bind(kit_id)
    .fetch_all(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to list kit items: {}", e)))?;

    rows.into_iter().map(KitItem::try_from).collect()
}

/// 構成品を追加
///
/// 参照先の工具・化学品が存在しなければ`NotFound`、同じ構成品の重複は`Conflict`。
pub async fn add_item(
    conn: &mut SqliteConnection,
    kit_id: i64,
    input: &NewKitItem,
) -> TrackerResult<KitItem> {
    if !input.quantity.is_finite() || input.quantity <= 0.0 {
        return Err(TrackerError::validation("quantity must be positive"));
    }

    let kit_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM kits WHERE id = ?")
        .bind(kit_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to find kit: {}", e)))?;
    if kit_exists.is_none() {
        return Err(TrackerError::NotFound(format!("kit {}", kit_id)));
    }

    let target_sql = match input.item_type {
        KitItemType::Tool => "SELECT id FROM tools WHERE id = ?",
        KitItemType::Chemical => "SELECT id FROM chemicals WHERE id = ?",
    };
    let target: Option<i64> = sqlx::query_scalar(target_sql)
        .bind(input.item_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to find kit item target: {}", e)))?;
    if target.is_none() {
        return Err(TrackerError::NotFound(format!(
            "{} {}",
            input.item_type.as_str(),
            input.item_id
        )));
    }

    let added_at = now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO kit_items (kit_id, item_type, item_id, quantity, added_at)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(kit_id)
    .bind(input.item_type.as_str())
    .bind(input.item_id)
    .bind(input.quantity)
    .bind(format_timestamp(&added_at))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        TrackerError::from_sqlx(
            &format!(
                "Kit {} item {} {}",
                kit_id,
                input.item_type.as_str(),
                input.item_id
            ),
            e,
        )
    })?;

    Ok(KitItem {
        id,
        kit_id,
        item_type: input.item_type,
        item_id: input.item_id,
        quantity: input.quantity,
        added_at,
    })
}

/// 構成品を削除
///
/// # Returns
/// * `Ok(KitItem)` - 削除した構成品
pub async fn remove_item(
    conn: &mut SqliteConnection,
    kit_id: i64,
    item_id: i64,
) -> TrackerResult<KitItem> {
    let row = sqlx::query_as::<_, KitItemRow>(
        "SELECT id, kit_id, item_type, item_id, quantity, added_at
         FROM kit_items WHERE id = ? AND kit_id = ?",
    )
    .bind(item_id)
    .bind(kit_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to find kit item: {}", e)))?
    .ok_or_else(|| TrackerError::NotFound(format!("kit {} item {}", kit_id, item_id)))?;

    sqlx::query("DELETE FROM kit_items WHERE id = ?")
        .bind(item_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to remove kit item: {}", e)))?;

    KitItem::try_from(row)
}

#[derive(sqlx::FromRow)]
struct KitRow {
    id: i64,
    name: String,
    aircraft_type: Option<String>,
    description: Option<String>,
    created_at: String,
}

impl TryFrom<KitRow> for Kit {
    type Error = TrackerError;

    fn try_from(row: KitRow) -> Result<Self, Self::Error> {
        Ok(Kit {
            id: row.id,
            name: row.name,
            aircraft_type: row.aircraft_type,
            description: row.description,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            items: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct KitItemRow {
    id: i64,
    kit_id: i64,
    item_type: String,
    item_id: i64,
    quantity: f64,
    added_at: String,
}

impl TryFrom<KitItemRow> for KitItem {
    type Error = TrackerError;

    fn try_from(row: KitItemRow) -> Result<Self, Self::Error> {
        let item_type = KitItemType::parse(&row.item_type).ok_or_else(|| {
            TrackerError::Database(format!("Invalid kit item type: {}", row.item_type))
        })?;
        Ok(KitItem {
            id: row.id,
            kit_id: row.kit_id,
            item_type,
            item_id: row.item_id,
            quantity: row.quantity,
            added_at: parse_timestamp("added_at", &row.added_at)?,
        })
    }
}
