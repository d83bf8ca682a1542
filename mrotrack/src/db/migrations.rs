// データベース初期化とマイグレーション実行

use crate::common::error::{TrackerError, TrackerResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLiteデータベース接続プールを作成してマイグレーションを実行
///
/// ファイルが無ければ作成し、親ディレクトリも用意する。
/// 外部キー制約を有効にし、ファイルDBではWALモードを使う。
///
/// # Arguments
/// * `database_url` - データベースURL（例: "sqlite:/var/lib/mrotrack/mrotrack.db"）
///
/// # Returns
/// * `Ok(SqlitePool)` - 初期化済みデータベースプール
/// * `Err(TrackerError)` - 初期化失敗
pub async fn initialize_database(database_url: &str) -> TrackerResult<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| TrackerError::Database(format!("Invalid database URL: {}", e)))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    if !in_memory {
        let filename = options.get_filename().to_path_buf();
        if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackerError::Database(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    tracing::info!(database = %database_url, "Opening database");
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 8 })
        .connect_with(options)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to connect to database: {}", e)))?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// 既存のデータベースファイルを読み取り専用で開く（バックアップ検証用）
pub async fn open_read_only(path: &Path) -> TrackerResult<SqlitePool> {
    if !path.exists() {
        return Err(TrackerError::NotFound(format!("database {}", path.display())));
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            TrackerError::Database(format!("Failed to open {}: {}", path.display(), e))
        })
}

/// マイグレーションを実行（sqlx::migrate!マクロを使用）
///
/// # Arguments
/// * `pool` - データベース接続プール
///
/// # Returns
/// * `Ok(())` - マイグレーション成功
/// * `Err(TrackerError)` - マイグレーション失敗
pub async fn run_migrations(pool: &SqlitePool) -> TrackerResult<()> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to run migrations: {}", e)))?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
