//! SHA-256ハッシュチェーン
//!
//! 各エントリは直前エントリのハッシュを含めてハッシュ化される。
//! どのフィールドを書き換えても、そのエントリ以降の検証が失敗する。

use crate::common::error::TrackerResult;
use crate::custody::types::{ChainVerificationResult, CustodyEntry};
use crate::db::custody::CustodyStorage;
use crate::db::format_timestamp;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// 先頭エントリのprev_hash（ゼロハッシュ）
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// 検証時に一度に読み込むエントリ数
pub const VERIFY_PAGE_SIZE: i64 = 1000;

const FIELD_SEPARATOR: u8 = 0x1f;

/// エントリのハッシュを計算
///
/// `SHA-256(prev_hash ␟ seq ␟ timestamp ␟ actor ␟ action ␟ entity_type ␟ entity_id ␟ detail)`
///
/// timestampは保存形式と同じRFC 3339（マイクロ秒）で、detailが無い場合は空文字列。
#[allow(clippy::too_many_arguments)]
pub fn compute_entry_hash(
    prev_hash: &str,
    seq: i64,
    timestamp: &DateTime<Utc>,
    actor: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    detail: Option<&str>,
) -> String {
    let seq = seq.to_string();
    let timestamp = format_timestamp(timestamp);
    let fields: [&str; 8] = [
        prev_hash,
        &seq,
        &timestamp,
        actor,
        action,
        entity_type,
        entity_id,
        detail.unwrap_or(""),
    ];

    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// 保存済みエントリのハッシュを再計算
pub fn recompute_hash(entry: &CustodyEntry) -> String {
    compute_entry_hash(
        &entry.prev_hash,
        entry.seq,
        &entry.timestamp,
        &entry.actor,
        &entry.action,
        &entry.entity_type,
        &entry.entity_id,
        entry.detail.as_deref(),
    )
}

/// 連続したエントリ列の検証状態
///
/// ページ単位で読み込むため、直前ページまでの末尾を持ち回る。
#[derive(Debug, Clone)]
pub struct ChainCursor {
    /// 次に期待する連番
    pub expected_seq: i64,
    /// 次のエントリのprev_hashとして期待する値
    pub expected_prev: String,
    /// 検証済みエントリ数
    pub checked: i64,
}

impl Default for ChainCursor {
    fn default() -> Self {
        Self {
            expected_seq: 1,
            expected_prev: GENESIS_HASH.to_string(),
            checked: 0,
        }
    }
}

/// 検証失敗の内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    /// 不整合を検出した連番
    pub seq: i64,
    /// 理由
    pub reason: String,
}

/// エントリ列を検証しカーソルを進める
///
/// 連番の連続性、prev_hashの連結、ハッシュの再計算の順に確認し、
/// 最初に失敗したエントリを返す。
pub fn verify_entries(cursor: &mut ChainCursor, entries: &[CustodyEntry]) -> Result<(), ChainBreak> {
    for entry in entries {
        if entry.seq != cursor.expected_seq {
            return Err(ChainBreak {
                seq: cursor.expected_seq,
                reason: format!(
                    "Sequence gap: expected seq {}, found {}",
                    cursor.expected_seq, entry.seq
                ),
            });
        }
        if entry.prev_hash != cursor.expected_prev {
            return Err(ChainBreak {
                seq: entry.seq,
                reason: format!("Previous hash mismatch at seq {}", entry.seq),
            });
        }
        let recomputed = recompute_hash(entry);
        if recomputed != entry.hash {
            return Err(ChainBreak {
                seq: entry.seq,
                reason: format!("Hash mismatch at seq {}", entry.seq),
            });
        }

        cursor.expected_seq += 1;
        cursor.expected_prev = entry.hash.clone();
        cursor.checked += 1;
    }
    Ok(())
}

impl ChainCursor {
    /// 検証結果に変換する
    pub fn into_result(self, failure: Option<ChainBreak>) -> ChainVerificationResult {
        let head_hash = (self.checked > 0).then(|| self.expected_prev.clone());
        match failure {
            None => ChainVerificationResult {
                valid: true,
                entries_checked: self.checked,
                first_invalid_seq: None,
                head_hash,
                message: (self.checked == 0).then(|| "No entries to verify".to_string()),
            },
            Some(ChainBreak { seq, reason }) => ChainVerificationResult {
                valid: false,
                entries_checked: self.checked,
                first_invalid_seq: Some(seq),
                head_hash,
                message: Some(reason),
            },
        }
    }
}

/// ストレージ上の全エントリのチェーンを検証
pub async fn verify_chain(storage: &CustodyStorage) -> TrackerResult<ChainVerificationResult> {
    let mut cursor = ChainCursor::default();
    let mut after_seq = 0;

    loop {
        let page = storage.range(after_seq, VERIFY_PAGE_SIZE).await?;
        let Some(last) = page.last() else {
            break;
        };
        after_seq = last.seq;

        if let Err(failure) = verify_entries(&mut cursor, &page) {
            warn!(
                seq = failure.seq,
                entries_checked = cursor.checked,
                "Custody chain broken: {}",
                failure.reason
            );
            return Ok(cursor.into_result(Some(failure)));
        }
    }

    info!(
        entries_checked = cursor.checked,
        "Custody chain verified"
    );
    Ok(cursor.into_result(None))
}
