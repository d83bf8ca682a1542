//! SQLiteバックアップとリストア
//!
//! バックアップは`VACUUM INTO`で一貫したコピーを作り、隣に
//! `<file>.manifest.json`を書く。リストアはコピーの検証に通ったものだけを
//! 受け付け、既存のデータベースは`.pre-restore-<timestamp>`として残す。

use crate::common::error::{TrackerError, TrackerResult};
use crate::custody::hash_chain::verify_chain;
use crate::custody::sha256_file;
use crate::custody::types::{ChainVerificationResult, CustodyHead};
use crate::db::custody::CustodyStorage;
use crate::db::migrations::open_read_only;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// バックアップマニフェストの形式バージョン
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// バックアップマニフェスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    /// 形式バージョン
    pub format_version: u32,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 作成したmrotrackのバージョン
    pub app_version: String,
    /// バックアップファイル名
    pub file_name: String,
    /// SHA-256（小文字16進）
    pub sha256: String,
    /// バイト数
    pub bytes: u64,
    /// カストディエントリ数
    pub custody_entries: i64,
    /// カストディログ末尾の連番
    pub head_seq: Option<i64>,
    /// カストディログ末尾のハッシュ
    pub head_hash: Option<String>,
    /// 作成時点でチェーンが検証できたか
    pub chain_valid: bool,
}

/// バックアップ検証結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupVerification {
    /// すべての検査に合格したか
    pub valid: bool,
    /// ファイルハッシュがマニフェストと一致したか
    pub sha256_matches: bool,
    /// コピー内のチェーン検証結果
    pub chain: ChainVerificationResult,
    /// 検出した問題
    pub problems: Vec<String>,
}

/// リストア結果
#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    /// 復元元
    pub restored_from: PathBuf,
    /// 復元先
    pub target: PathBuf,
    /// 退避した既存データベース
    pub moved_aside: Option<PathBuf>,
    /// 復元後のカストディエントリ数
    pub custody_entries: i64,
    /// 復元後の末尾連番
    pub head_seq: Option<i64>,
    /// 復元後の末尾ハッシュ
    pub head_hash: Option<String>,
}

/// バックアップファイルに対応するマニフェストのパス
pub fn manifest_path(backup: &Path) -> PathBuf {
    let mut name = backup.as_os_str().to_owned();
    name.push(".manifest.json");
    PathBuf::from(name)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// コピー内のカストディログの状態
struct CopyState {
    count: i64,
    head: Option<CustodyHead>,
    chain: ChainVerificationResult,
}

async fn inspect_copy(path: &Path) -> TrackerResult<CopyState> {
    let pool = open_read_only(path).await?;
    let storage = CustodyStorage::new(pool.clone());
    let state = async {
        Ok::<_, TrackerError>(CopyState {
            count: storage.count().await?,
            head: storage.head().await?,
            chain: verify_chain(&storage).await?,
        })
    }
    .await;
    pool.close().await;
    state
}

async fn is_in_memory(pool: &SqlitePool) -> TrackerResult<bool> {
    let file: Option<String> =
        sqlx::query_scalar("SELECT file FROM pragma_database_list WHERE name = 'main'")
            .fetch_optional(pool)
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to inspect database: {}", e)))?;
    Ok(file.map_or(true, |f| f.is_empty()))
}

/// バックアップを作成する
///
/// # Arguments
/// * `pool` - 稼働中のデータベース
/// * `dest` - 出力ファイル（存在してはならない）
///
/// # Returns
/// * `Ok(BackupManifest)` - 書き出したマニフェスト
/// * `Err(TrackerError::Conflict)` - 出力先が既に存在する
/// * `Err(TrackerError::Common)` - インメモリデータベースはバックアップできない
pub async fn create_backup(pool: &SqlitePool, dest: &Path) -> TrackerResult<BackupManifest> {
    // インメモリDBでは`VACUUM INTO`の出力先もメモリ上に作られ、ファイルが残らない
    if is_in_memory(pool).await? {
        return Err(TrackerError::validation(
            "an in-memory database cannot be backed up; configure a file database",
        ));
    }
    if dest.exists() {
        return Err(TrackerError::Conflict(format!(
            "Backup destination {} already exists",
            dest.display()
        )));
    }
    let dest_str = dest
        .to_str()
        .ok_or_else(|| TrackerError::validation("backup path must be valid UTF-8"))?;
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    sqlx::query("VACUUM INTO ?")
        .bind(dest_str)
        .execute(pool)
        .await
        .map_err(|e| TrackerError::Database(format!("VACUUM INTO failed: {}", e)))?;

    let (sha256, bytes) = sha256_file(dest).await?;
    let CopyState { count, head, chain } = inspect_copy(dest).await?;
    if !chain.valid {
        warn!(
            backup = %dest.display(),
            first_invalid_seq = ?chain.first_invalid_seq,
            "Backup written from a database whose custody chain does not verify"
        );
    }

    let manifest = BackupManifest {
        format_version: BACKUP_FORMAT_VERSION,
        created_at: crate::db::now(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        file_name: dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        sha256,
        bytes,
        custody_entries: count,
        head_seq: head.as_ref().map(|h| h.seq),
        head_hash: head.map(|h| h.hash),
        chain_valid: chain.valid,
    };

    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| TrackerError::Internal(format!("Failed to serialize manifest: {}", e)))?;
    tokio::fs::write(manifest_path(dest), json).await?;

    info!(
        backup = %dest.display(),
        bytes,
        custody_entries = count,
        head_seq = ?manifest.head_seq,
        "Backup created"
    );
    Ok(manifest)
}

/// マニフェストを読み込む
pub async fn read_manifest(backup: &Path) -> TrackerResult<BackupManifest> {
    let path = manifest_path(backup);
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| TrackerError::Integrity(format!("Cannot read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&data)
        .map_err(|e| TrackerError::Integrity(format!("Malformed backup manifest: {}", e)))
}

/// バックアップを検証する
///
/// ファイルハッシュ、コピー内のチェーン、エントリ数と末尾をマニフェストと照合する。
pub async fn verify_backup(backup: &Path) -> TrackerResult<BackupVerification> {
    let manifest = read_manifest(backup).await?;
    let mut problems = Vec::new();

    if manifest.format_version != BACKUP_FORMAT_VERSION {
        problems.push(format!(
            "Unsupported format_version {}",
            manifest.format_version
        ));
    }

    let (sha256, bytes) = sha256_file(backup).await?;
    let sha256_matches = sha256 == manifest.sha256 && bytes == manifest.bytes;
    if !sha256_matches {
        problems.push("Backup file hash differs from manifest".to_string());
    }

    // 破損したファイルはSQLiteが開けないことがあるので、読み出し失敗も問題として扱う
    let chain = match inspect_copy(backup).await {
        Ok(CopyState { count, head, chain }) => {
            if !chain.valid {
                problems.push(
                    chain
                        .message
                        .clone()
                        .unwrap_or_else(|| "Custody chain does not verify".to_string()),
                );
            }
            if count != manifest.custody_entries {
                problems.push(format!(
                    "Custody entry count {} differs from manifest {}",
                    count, manifest.custody_entries
                ));
            }
            if head.map(|h| h.hash) != manifest.head_hash {
                problems.push("Custody head differs from manifest".to_string());
            }
            chain
        }
        Err(e) => {
            problems.push(format!("Cannot read custody log from backup: {}", e));
            ChainVerificationResult {
                valid: false,
                entries_checked: 0,
                first_invalid_seq: None,
                head_hash: None,
                message: Some(e.to_string()),
            }
        }
    };

    let valid = problems.is_empty();
    if valid {
        info!(backup = %backup.display(), entries = manifest.custody_entries, "Backup verified");
    } else {
        warn!(backup = %backup.display(), problems = ?problems, "Backup failed verification");
    }

    Ok(BackupVerification {
        valid,
        sha256_matches,
        chain,
        problems,
    })
}

async fn existing_custody_count(target: &Path) -> TrackerResult<i64> {
    let pool = open_read_only(target).await?;
    let count: Result<i64, sqlx::Error> = async {
        // custody_logが無い（未初期化の）ファイルだけを空とみなす
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'custody_log'",
        )
        .fetch_one(&pool)
        .await?;
        if present == 0 {
            return Ok(0);
        }
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM custody_log")
            .fetch_one(&pool)
            .await
    }
    .await;
    pool.close().await;
    count.map_err(|e| {
        TrackerError::Database(format!(
            "Cannot count custody entries in {}: {}",
            target.display(),
            e
        ))
    })
}

async fn checkpoint(target: &Path) -> TrackerResult<()> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(target)
        .create_if_missing(false);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to open {}: {}", target.display(), e)))?;
    let result = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(&pool)
        .await;
    pool.close().await;
    result.map_err(|e| TrackerError::Database(format!("Failed to checkpoint: {}", e)))?;
    Ok(())
}

/// バックアップからデータベースを復元する
///
/// サーバー停止中に実行すること。
///
/// 1. バックアップを検証する（不合格なら中止）
/// 2. 復元先にバックアップより多いカストディエントリがあれば`force`なしでは中止
/// 3. 既存ファイルをWALチェックポイント後に`.pre-restore-<timestamp>`へ退避
/// 4. 一時ファイルへコピーしてからリネームし、古い`-wal`/`-shm`を削除
pub async fn restore_backup(
    backup: &Path,
    target: &Path,
    force: bool,
) -> TrackerResult<RestoreOutcome> {
    let verification = verify_backup(backup).await?;
    if !verification.valid {
        return Err(TrackerError::Integrity(format!(
            "Backup {} failed verification: {}",
            backup.display(),
            verification.problems.join("; ")
        )));
    }
    let manifest = read_manifest(backup).await?;

    let mut moved_aside = None;
    if target.exists() {
        let current = existing_custody_count(target).await?;
        if current > manifest.custody_entries && !force {
            return Err(TrackerError::Conflict(format!(
                "{} holds {} custody entries but the backup only {}; use --force to discard the newer entries",
                target.display(),
                current,
                manifest.custody_entries
            )));
        }

        checkpoint(target).await?;
        let aside = sibling_with_suffix(
            target,
            &format!(".pre-restore-{}", Utc::now().format("%Y%m%dT%H%M%SZ")),
        );
        tokio::fs::rename(target, &aside).await?;
        warn!(
            target = %target.display(),
            moved_to = %aside.display(),
            custody_entries = current,
            "Existing database moved aside before restore"
        );
        moved_aside = Some(aside);
    }

    for suffix in ["-wal", "-shm"] {
        let stale = sibling_with_suffix(target, suffix);
        if stale.exists() {
            tokio::fs::remove_file(&stale).await?;
        }
    }

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp = sibling_with_suffix(target, ".restore-tmp");
    tokio::fs::copy(backup, &temp).await?;
    tokio::fs::rename(&temp, target).await?;

    let restored = inspect_copy(target).await?;
    let head_hash = restored.head.as_ref().map(|h| h.hash.clone());
    if !restored.chain.valid || head_hash != manifest.head_hash {
        return Err(TrackerError::Integrity(format!(
            "Restored database at {} does not match the backup manifest",
            target.display()
        )));
    }

    info!(
        backup = %backup.display(),
        target = %target.display(),
        custody_entries = restored.count,
        "Database restored"
    );

    Ok(RestoreOutcome {
        restored_from: backup.to_path_buf(),
        target: target.to_path_buf(),
        moved_aside,
        custody_entries: restored.count,
        head_seq: restored.head.map(|h| h.seq),
        head_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::types::{actions, CustodyEvent};
    use crate::custody::CustodyLog;
    use crate::db::migrations::initialize_database;

    async fn file_log(path: &Path, entries: i64) -> CustodyLog {
        let pool = initialize_database(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        let log = CustodyLog::new(pool);
        for n in 1..=entries {
            log.append(CustodyEvent::new("alice", actions::TOOL_CREATE, "tool", n))
                .await
                .unwrap();
        }
        log
    }

    #[tokio::test]
    async fn test_backup_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let log = file_log(&dir.path().join("live.db"), 3).await;
        let backup = dir.path().join("backups").join("b1.db");

        let manifest = create_backup(log.pool(), &backup).await.unwrap();
        assert!(backup.exists());
        assert!(manifest_path(&backup).exists());
        assert_eq!(manifest.custody_entries, 3);
        assert_eq!(manifest.head_seq, Some(3));
        assert!(manifest.chain_valid);

        let head = log.storage().head().await.unwrap().unwrap();
        assert_eq!(manifest.head_hash.as_deref(), Some(head.hash.as_str()));

        let report = verify_backup(&backup).await.unwrap();
        assert!(report.valid, "{:?}", report.problems);
    }

    #[tokio::test]
    async fn test_backup_rejects_memory_database() {
        let pool = crate::db::test_utils::test_db_pool().await;
        let log = CustodyLog::new(pool);
        log.append(CustodyEvent::new("alice", actions::KIT_CREATE, "kit", 1))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("mem.db");

        let err = create_backup(log.pool(), &backup).await.unwrap_err();
        assert!(matches!(err, TrackerError::Common(_)), "{err:?}");
        assert!(!backup.exists());
        assert!(!manifest_path(&backup).exists());
    }

    #[tokio::test]
    async fn test_backup_refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let log = file_log(&dir.path().join("live.db"), 1).await;
        let backup = dir.path().join("b.db");
        std::fs::write(&backup, b"occupied").unwrap();

        assert!(matches!(
            create_backup(log.pool(), &backup).await,
            Err(TrackerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_modified_backup_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let log = file_log(&dir.path().join("live.db"), 2).await;
        let backup = dir.path().join("b.db");
        create_backup(log.pool(), &backup).await.unwrap();

        // バックアップ内のエントリを書き換える
        let options = sqlx::sqlite::SqliteConnectOptions::new().filename(&backup);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::query("DROP TRIGGER custody_log_no_update")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE custody_log SET actor = 'mallory' WHERE seq = 1")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let report = verify_backup(&backup).await.unwrap();
        assert!(!report.valid);
        assert!(!report.sha256_matches);
        assert!(!report.chain.valid);
    }

    #[tokio::test]
    async fn test_restore_reproduces_head() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live.db");
        let log = file_log(&live, 3).await;
        let backup = dir.path().join("b.db");
        let manifest = create_backup(log.pool(), &backup).await.unwrap();
        log.pool().close().await;

        let target = dir.path().join("restored").join("mrotrack.db");
        let outcome = restore_backup(&backup, &target, false).await.unwrap();
        assert!(outcome.moved_aside.is_none());
        assert_eq!(outcome.custody_entries, 3);
        assert_eq!(outcome.head_hash, manifest.head_hash);

        let pool = initialize_database(&format!("sqlite:{}", target.display()))
            .await
            .unwrap();
        let head = CustodyStorage::new(pool).head().await.unwrap().unwrap();
        assert_eq!(Some(head.hash), manifest.head_hash);
    }

    #[tokio::test]
    async fn test_restore_refuses_to_lose_newer_entries_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live.db");
        let log = file_log(&live, 2).await;
        let backup = dir.path().join("b.db");
        let manifest = create_backup(log.pool(), &backup).await.unwrap();

        log.append(CustodyEvent::new("alice", actions::TOOL_UPDATE, "tool", 1))
            .await
            .unwrap();
        log.pool().close().await;

        let err = restore_backup(&backup, &live, false).await.unwrap_err();
        assert!(matches!(err, TrackerError::Conflict(_)));

        let outcome = restore_backup(&backup, &live, true).await.unwrap();
        let aside = outcome.moved_aside.expect("live database moved aside");
        assert!(aside.exists());
        assert_eq!(outcome.custody_entries, 2);
        assert_eq!(outcome.head_hash, manifest.head_hash);

        // 退避したファイルには3件目が残っている
        let old = open_read_only(&aside).await.unwrap();
        assert_eq!(CustodyStorage::new(old).count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_restore_rejects_tampered_backup() {
        let dir = tempfile::tempdir().unwrap();
        let log = file_log(&dir.path().join("live.db"), 1).await;
        let backup = dir.path().join("b.db");
        create_backup(log.pool(), &backup).await.unwrap();

        let mut data = std::fs::read(&backup).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        std::fs::write(&backup, data).unwrap();

        let target = dir.path().join("target.db");
        let err = restore_backup(&backup, &target, true).await.unwrap_err();
        assert!(matches!(err, TrackerError::Integrity(_)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_restore_onto_uninitialized_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = file_log(&dir.path().join("live.db"), 2).await;
        let backup = dir.path().join("b.db");
        create_backup(log.pool(), &backup).await.unwrap();

        let target = dir.path().join("blank.db");
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&target)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::query("CREATE TABLE notes (body TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let outcome = restore_backup(&backup, &target, false).await.unwrap();
        assert!(outcome.moved_aside.is_some());
        assert_eq!(outcome.custody_entries, 2);
    }

    #[tokio::test]
    async fn test_restore_stops_when_existing_log_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let log = file_log(&dir.path().join("live.db"), 1).await;
        let backup = dir.path().join("b.db");
        create_backup(log.pool(), &backup).await.unwrap();

        // custody_logはあるが読めない
        let target = dir.path().join("broken.db");
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&target)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::query("CREATE VIEW custody_log AS SELECT * FROM missing_table")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let err = restore_backup(&backup, &target, false).await.unwrap_err();
        assert!(matches!(err, TrackerError::Database(_)), "{err:?}");
        assert!(target.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".pre-restore-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
