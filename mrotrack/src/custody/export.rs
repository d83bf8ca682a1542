//! CSVエクスポートとマニフェスト
//!
//! エクスポートディレクトリの構成:
//!
//! ```text
//! <dir>/
//!   custody_log.csv
//!   tools.csv
//!   chemicals.csv
//!   checkouts.csv
//!   procurement_orders.csv
//!   manifest.json
//! ```
//!
//! マニフェストは各ファイルのSHA-256と行数、カストディログの末尾を持つ。
//! `verify_bundle`はファイルのハッシュとカストディログのチェーンを検証し直す。

use crate::common::error::{TrackerError, TrackerResult};
use crate::custody::hash_chain::{verify_entries, ChainCursor, VERIFY_PAGE_SIZE};
use crate::custody::sha256_hex;
use crate::custody::types::CustodyEntry;
use crate::db::{self, checkouts, chemicals, orders, tools};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

/// マニフェストの形式バージョン
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// マニフェストのファイル名
pub const MANIFEST_FILE: &str = "manifest.json";

/// カストディログCSVのファイル名
pub const CUSTODY_LOG_FILE: &str = "custody_log.csv";

/// エクスポートされたファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFile {
    /// ファイル名（ディレクトリ相対）
    pub name: String,
    /// データ行数（ヘッダーを除く）
    pub rows: u64,
    /// SHA-256（小文字16進）
    pub sha256: String,
    /// バイト数
    pub bytes: u64,
}

/// エクスポートマニフェスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    /// 形式バージョン
    pub format_version: u32,
    /// 生成日時
    pub generated_at: DateTime<Utc>,
    /// 生成したmrotrackのバージョン
    pub app_version: String,
    /// ファイル一覧
    pub files: Vec<ExportedFile>,
    /// カストディログ末尾の連番
    pub head_seq: Option<i64>,
    /// カストディログ末尾のハッシュ
    pub head_hash: Option<String>,
}

/// エクスポート検証結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportVerification {
    /// すべての検査に合格したか
    pub valid: bool,
    /// 検査したファイル数
    pub files_checked: usize,
    /// CSVから読み込んだカストディエントリ数
    pub custody_entries: i64,
    /// マニフェスト上の末尾連番
    pub head_seq: Option<i64>,
    /// 検出した問題
    pub problems: Vec<String>,
}

/// カストディログCSVの1行
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CustodyCsvRecord {
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

impl From<&CustodyEntry> for CustodyCsvRecord {
    fn from(entry: &CustodyEntry) -> Self {
        Self {
            seq: entry.seq,
            timestamp: db::format_timestamp(&entry.timestamp),
            actor: entry.actor.clone(),
            action: entry.action.clone(),
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            detail: entry.detail.clone(),
            prev_hash: entry.prev_hash.clone(),
            hash: entry.hash.clone(),
        }
    }
}

impl TryFrom<CustodyCsvRecord> for CustodyEntry {
    type Error = TrackerError;

    fn try_from(record: CustodyCsvRecord) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                TrackerError::Integrity(format!(
                    "Invalid timestamp at seq {}: {}",
                    record.seq, e
                ))
            })?;
        Ok(CustodyEntry {
            seq: record.seq,
            timestamp,
            actor: record.actor,
            action: record.action,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            detail: record.detail.filter(|d| !d.is_empty()),
            prev_hash: record.prev_hash,
            hash: record.hash,
        })
    }
}

fn csv_error(name: &str, err: impl std::fmt::Display) -> TrackerError {
    TrackerError::Internal(format!("Failed to write {}: {}", name, err))
}

/// レコード列をCSVにシリアライズする
fn serialize_csv<T: Serialize>(name: &str, records: &[T]) -> TrackerResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for record in records {
        writer.serialize(record).map_err(|e| csv_error(name, e))?;
    }
    writer.into_inner().map_err(|e| csv_error(name, e))
}

/// カストディエントリをCSVにする（ヘッダー付き）
pub fn custody_csv(entries: &[CustodyEntry]) -> TrackerResult<Vec<u8>> {
    let records: Vec<CustodyCsvRecord> = entries.iter().map(CustodyCsvRecord::from).collect();
    if records.is_empty() {
        // 0件でもヘッダー行は出力する
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record([
                "seq",
                "timestamp",
                "actor",
                "action",
                "entity_type",
                "entity_id",
                "detail",
                "prev_hash",
                "hash",
            ])
            .map_err(|e| csv_error(CUSTODY_LOG_FILE, e))?;
        return writer
            .into_inner()
            .map_err(|e| csv_error(CUSTODY_LOG_FILE, e));
    }
    serialize_csv(CUSTODY_LOG_FILE, &records)
}

/// カストディログCSVを読み込む
pub fn parse_custody_csv(data: &[u8]) -> TrackerResult<Vec<CustodyEntry>> {
    let mut reader = csv::Reader::from_reader(data);
    reader
        .deserialize::<CustodyCsvRecord>()
        .map(|record| {
            record
                .map_err(|e| TrackerError::Integrity(format!("Malformed {}: {}", CUSTODY_LOG_FILE, e)))
                .and_then(CustodyEntry::try_from)
        })
        .collect()
}

/// 全カストディエントリを読み込み、チェーンを検証する
///
/// チェーンが壊れている場合は`Integrity`エラー。
async fn load_verified_chain(conn: &mut sqlx::SqliteConnection) -> TrackerResult<Vec<CustodyEntry>> {
    let mut cursor = ChainCursor::default();
    let mut entries = Vec::new();
    let mut after_seq = 0;

    loop {
        let page = db::custody::range(&mut *conn, after_seq, VERIFY_PAGE_SIZE).await?;
        let Some(last) = page.last() else {
            break;
        };
        after_seq = last.seq;

        if let Err(failure) = verify_entries(&mut cursor, &page) {
            warn!(seq = failure.seq, "Refusing export: {}", failure.reason);
            return Err(TrackerError::Integrity(format!(
                "Custody chain does not verify: {}",
                failure.reason
            )));
        }
        entries.extend(page);
    }
    Ok(entries)
}

/// 検証済みのカストディログ全体をCSVにする（API配信用）
///
/// # Returns
/// * `Ok((csv, entries))` - CSVとエントリ数
/// * `Err(TrackerError::Integrity)` - チェーンが検証できない
pub async fn export_custody_log(pool: &SqlitePool) -> TrackerResult<(Vec<u8>, usize)> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to acquire connection: {}", e)))?;
    let entries = load_verified_chain(&mut conn).await?;
    Ok((custody_csv(&entries)?, entries.len()))
}

async fn write_file(dir: &Path, name: &str, data: Vec<u8>, rows: usize) -> TrackerResult<ExportedFile> {
    let file = ExportedFile {
        name: name.to_string(),
        rows: rows as u64,
        sha256: sha256_hex(&data),
        bytes: data.len() as u64,
    };
    tokio::fs::write(dir.join(name), data).await?;
    Ok(file)
}

/// エクスポートバンドルを書き出す
///
/// 読み出しは1つのトランザクション内で行い、各CSVとマニフェストが同じ時点を指す。
/// 既にマニフェストがあるディレクトリには書き出さない。
pub async fn export_bundle(pool: &SqlitePool, dir: &Path) -> TrackerResult<ExportManifest> {
    if dir.join(MANIFEST_FILE).exists() {
        return Err(TrackerError::Conflict(format!(
            "{} already contains an export",
            dir.display()
        )));
    }
    tokio::fs::create_dir_all(dir).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to begin export: {}", e)))?;

    let entries = load_verified_chain(&mut tx).await?;
    let tools = tools::list(&mut *tx, &Default::default()).await?;
    let chemicals = chemicals::list(&mut *tx, &Default::default()).await?;
    let checkouts = checkouts::list(&mut *tx, &Default::default()).await?;
    let orders = orders::list(&mut *tx, None).await?;
    tx.rollback()
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to end export: {}", e)))?;

    let files = vec![
        write_file(dir, CUSTODY_LOG_FILE, custody_csv(&entries)?, entries.len()).await?,
        write_file(dir, "tools.csv", serialize_csv("tools.csv", &tools)?, tools.len()).await?,
        write_file(
            dir,
            "chemicals.csv",
            serialize_csv("chemicals.csv", &chemicals)?,
            chemicals.len(),
        )
        .await?,
        write_file(
            dir,
            "checkouts.csv",
            serialize_csv("checkouts.csv", &checkouts)?,
            checkouts.len(),
        )
        .await?,
        write_file(
            dir,
            "procurement_orders.csv",
            serialize_csv("procurement_orders.csv", &orders)?,
            orders.len(),
        )
        .await?,
    ];

    let last = entries.last();
    let manifest = ExportManifest {
        format_version: EXPORT_FORMAT_VERSION,
        generated_at: db::now(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        files,
        head_seq: last.map(|e| e.seq),
        head_hash: last.map(|e| e.hash.clone()),
    };

    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| TrackerError::Internal(format!("Failed to serialize manifest: {}", e)))?;
    tokio::fs::write(dir.join(MANIFEST_FILE), json).await?;

    info!(
        dir = %dir.display(),
        custody_entries = entries.len(),
        head_seq = ?manifest.head_seq,
        "Export bundle written"
    );
    Ok(manifest)
}

/// エクスポートバンドルを検証する
///
/// マニフェストが読めない場合はエラー、個々の不一致は`problems`に積む。
pub async fn verify_bundle(dir: &Path) -> TrackerResult<ExportVerification> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_bytes = tokio::fs::read(&manifest_path).await.map_err(|e| {
        TrackerError::Integrity(format!("Cannot read {}: {}", manifest_path.display(), e))
    })?;
    let manifest: ExportManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| TrackerError::Integrity(format!("Malformed manifest: {}", e)))?;

    let mut problems = Vec::new();
    if manifest.format_version != EXPORT_FORMAT_VERSION {
        problems.push(format!(
            "Unsupported format_version {}",
            manifest.format_version
        ));
    }

    let mut custody_data = None;
    for file in &manifest.files {
        let data = match tokio::fs::read(dir.join(&file.name)).await {
            Ok(data) => data,
            Err(e) => {
                problems.push(format!("{}: cannot read ({})", file.name, e));
                continue;
            }
        };
        if data.len() as u64 != file.bytes {
            problems.push(format!(
                "{}: size {} differs from manifest {}",
                file.name,
                data.len(),
                file.bytes
            ));
        }
        if sha256_hex(&data) != file.sha256 {
            problems.push(format!("{}: sha256 mismatch", file.name));
        }
        if file.name == CUSTODY_LOG_FILE {
            custody_data = Some(data);
        }
    }

    let mut custody_entries = 0;
    match custody_data {
        None => problems.push(format!("{} is not listed in the manifest", CUSTODY_LOG_FILE)),
        Some(data) => match parse_custody_csv(&data) {
            Err(e) => problems.push(e.to_string()),
            Ok(entries) => {
                custody_entries = entries.len() as i64;
                let mut cursor = ChainCursor::default();
                if let Err(failure) = verify_entries(&mut cursor, &entries) {
                    problems.push(failure.reason);
                }
                let last = entries.last();
                if last.map(|e| e.seq) != manifest.head_seq
                    || last.map(|e| e.hash.as_str()) != manifest.head_hash.as_deref()
                {
                    problems.push("Custody head differs from manifest".to_string());
                }
            }
        },
    }

    let valid = problems.is_empty();
    if valid {
        info!(dir = %dir.display(), custody_entries, "Export bundle verified");
    } else {
        warn!(dir = %dir.display(), problems = ?problems, "Export bundle failed verification");
    }

    Ok(ExportVerification {
        valid,
        files_checked: manifest.files.len(),
        custody_entries,
        head_seq: manifest.head_seq,
        problems,
    })
}
