//! CLI module for mrotrack
//!
//! サーバー起動と、サーバー停止中に行うカストディ操作（検証・エクスポート・
//! バックアップ・リストア）を提供する。

/// backup / restore
pub mod backup;
/// custody verify / export
pub mod custody;
/// serve
pub mod serve;

use crate::config::StorageConfig;
use clap::{Parser, Subcommand};

/// MRO inventory tracker with a hash-chained custody log
#[derive(Parser, Debug)]
#[command(name = "mrotrack")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    MROTRACK_HOST                          Bind address (default: 0.0.0.0)
    MROTRACK_PORT                          Listen port (default: 8080)
    MROTRACK_DATA_DIR                      Data directory (default: ~/.mrotrack)
    MROTRACK_DATABASE_URL                  Database URL (default: sqlite:<data_dir>/mrotrack.db)
    MROTRACK_BACKUP_DIR                    Backup directory (default: <data_dir>/backups)
    MROTRACK_LOG_LEVEL                     Log level (default: info)
    MROTRACK_LOG_DIR                       Log directory (default: <data_dir>/logs)
    MROTRACK_JWT_SECRET                    JWT signing key (auto-generated if not set)
    MROTRACK_ADMIN_USERNAME                Initial admin username (default: admin)
    MROTRACK_ADMIN_PASSWORD                Initial admin password (generated if not set)
    MROTRACK_CUSTODY_VERIFY_INTERVAL_SECS  Periodic chain verification (default: 86400, 0 disables)
"#)]
pub struct Cli {
    /// Database URL
    #[arg(long, global = true, env = "MROTRACK_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// `--database-url`を反映したストレージ設定
    pub fn storage_config(&self) -> StorageConfig {
        let mut storage = StorageConfig::from_env();
        if let Some(url) = &self.database_url {
            storage.database_url = url.clone();
        }
        storage
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve(serve::ServeArgs),
    /// Verify or export the custody log
    Custody(custody::CustodyArgs),
    /// Create or verify a database backup
    Backup(backup::BackupArgs),
    /// Restore the database from a verified backup (server must be stopped)
    Restore(backup::RestoreArgs),
}
