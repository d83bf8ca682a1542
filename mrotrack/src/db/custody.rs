//! カストディログストレージ
//!
//! `custody_log`テーブルへの読み書き。挿入は`custody::CustodyLog`経由でのみ行う。
//! UPDATE/DELETEはトリガーで拒否される。

use crate::common::error::{TrackerError, TrackerResult};
use crate::custody::types::{CustodyEntry, CustodyFilter, CustodyHead};
use crate::db::{format_timestamp, parse_timestamp};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

const ENTRY_COLUMNS: &str =
    "seq, timestamp, actor, action, entity_type, entity_id, detail, prev_hash, hash";

/// カストディログストレージ
#[derive(Clone)]
pub struct CustodyStorage {
    pool: SqlitePool,
}

impl CustodyStorage {
    /// 新しいストレージインスタンスを作成
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 接続プールへの参照
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// チェーン末尾を取得
    pub async fn head(&self) -> TrackerResult<Option<CustodyHead>> {
        head(&self.pool).await
    }

    /// 全エントリ数
    pub async fn count(&self) -> TrackerResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM custody_log")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to count custody entries: {}", e)))
    }

    /// `after_seq`より後のエントリを連番順に最大`limit`件取得
    pub async fn range(&self, after_seq: i64, limit: i64) -> TrackerResult<Vec<CustodyEntry>> {
        range(&self.pool, after_seq, limit).await
    }

    /// 連番でエントリを取得
    pub async fn get(&self, seq: i64) -> TrackerResult<Option<CustodyEntry>> {
        let row = sqlx::query_as::<_, CustodyRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM custody_log WHERE seq = ?"
        ))
        .bind(seq)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to read custody entry: {}", e)))?;

        row.map(CustodyEntry::try_from).transpose()
    }

    /// フィルタ条件でエントリを検索（新しい順、ページング）
    pub async fn query(&self, filter: &CustodyFilter) -> TrackerResult<Vec<CustodyEntry>> {
        let (where_clause, bind_values) = build_where_clause(filter);
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter.per_page.unwrap_or(50).clamp(1, 500);
        let offset = (page - 1) * per_page;

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM custody_log {} ORDER BY seq DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut query = sqlx::query_as::<_, CustodyRow>(&sql);
        for val in &bind_values {
            query = query.bind(val.as_str());
        }
        query = query.bind(per_page).bind(offset);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to query custody log: {}", e)))?;

        rows.into_iter().map(CustodyEntry::try_from).collect()
    }

    /// フィルタ条件に一致する件数
    pub async fn count_filtered(&self, filter: &CustodyFilter) -> TrackerResult<i64> {
        let (where_clause, bind_values) = build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM custody_log {}", where_clause);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for val in &bind_values {
            query = query.bind(val.as_str());
        }

        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to count custody log: {}", e)))
    }
}

/// チェーン末尾を取得（トランザクション内からも使う）
pub async fn head<'e, E>(executor: E) -> TrackerResult<Option<CustodyHead>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT seq, hash FROM custody_log ORDER BY seq DESC LIMIT 1")
            .fetch_optional(executor)
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to read custody head: {}", e)))?;

    Ok(row.map(|(seq, hash)| CustodyHead { seq, hash }))
}

/// `after_seq`より後のエントリを連番順に最大`limit`件取得
pub async fn range<'e, E>(executor: E, after_seq: i64, limit: i64) -> TrackerResult<Vec<CustodyEntry>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query_as::<_, CustodyRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM custody_log WHERE seq > ? ORDER BY seq ASC LIMIT ?"
    ))
    .bind(after_seq)
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to read custody entries: {}", e)))?;

    rows.into_iter().map(CustodyEntry::try_from).collect()
}

/// エントリを挿入
pub(crate) async fn insert(conn: &mut SqliteConnection, entry: &CustodyEntry) -> TrackerResult<()> {
    sqlx::query(
        "INSERT INTO custody_log (seq, timestamp, actor, action, entity_type, entity_id, detail, prev_hash, hash)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.seq)
    .bind(format_timestamp(&entry.timestamp))
    .bind(&entry.actor)
    .bind(&entry.action)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.detail)
    .bind(&entry.prev_hash)
    .bind(&entry.hash)
    .execute(&mut *conn)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to append custody entry {}: {}", entry.seq, e)))?;

    Ok(())
}

fn build_where_clause(filter: &CustodyFilter) -> (String, Vec<String>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut bind_values: Vec<String> = Vec::new();

    if let Some(ref actor) = filter.actor {
        conditions.push("actor = ?");
        bind_values.push(actor.clone());
    }
    if let Some(ref action) = filter.action {
        conditions.push("action = ?");
        bind_values.push(action.clone());
    }
    if let Some(ref entity_type) = filter.entity_type {
        conditions.push("entity_type = ?");
        bind_values.push(entity_type.clone());
    }
    if let Some(ref entity_id) = filter.entity_id {
        conditions.push("entity_id = ?");
        bind_values.push(entity_id.clone());
    }
    if let Some(ref time_from) = filter.time_from {
        conditions.push("timestamp >= ?");
        bind_values.push(format_timestamp(time_from));
    }
    if let Some(ref time_to) = filter.time_to {
        conditions.push("timestamp <= ?");
        bind_values.push(format_timestamp(time_to));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values)
}

#[derive(sqlx::FromRow)]
struct CustodyRow {
    seq: i64,
    timestamp: String,
    actor: String,
    action: String,
    entity_type: String,
    entity_id: String,
    detail: Option<String>,
    prev_hash: String,
    hash: String,
}

impl TryFrom<CustodyRow> for CustodyEntry {
    type Error = TrackerError;

    fn try_from(row: CustodyRow) -> Result<Self, Self::Error> {
        Ok(CustodyEntry {
            seq: row.seq,
            timestamp: parse_timestamp("timestamp", &row.timestamp)?,
            actor: row.actor,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            detail: row.detail,
            prev_hash: row.prev_hash,
            hash: row.hash,
        })
    }
}
