//! backup / restore サブコマンド
//!
//! リストアは稼働中のサーバーが無い状態で実行すること。

use crate::cli::custody::print_chain_result;
use crate::config::StorageConfig;
use crate::custody::backup::{
    create_backup, restore_backup, verify_backup, BackupManifest, BackupVerification,
};
use crate::custody::types::SYSTEM_ACTOR;
use crate::custody::{actions, CustodyEvent, CustodyLog};
use crate::db::migrations::initialize_database;
use clap::{Args, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};

/// backup サブコマンドの引数
#[derive(Args, Debug, Clone)]
#[command(args_conflicts_with_subcommands = true)]
pub struct BackupArgs {
    /// Backup operation (omit to create a backup)
    #[command(subcommand)]
    pub command: Option<BackupCommand>,

    /// Destination file (default: <backup_dir>/mrotrack-<timestamp>.db)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// backup の操作
#[derive(Subcommand, Debug, Clone)]
pub enum BackupCommand {
    /// Verify a backup file against its manifest
    Verify {
        /// Backup file
        #[arg(long)]
        file: PathBuf,
    },
}

/// restore サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    /// Backup file to restore from
    #[arg(long)]
    pub from: PathBuf,

    /// Restore even if the current database holds newer custody entries
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// バックアップ出力先の既定パス
pub fn default_backup_path(storage: &StorageConfig) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%6fZ");
    storage.backup_dir.join(format!("mrotrack-{}.db", stamp))
}

/// Execute the backup command
///
/// 検証に合格しなかった場合は`Ok(false)`を返す。
pub async fn execute(args: &BackupArgs, storage: &StorageConfig) -> anyhow::Result<bool> {
    match &args.command {
        Some(BackupCommand::Verify { file }) => {
            let verification = verify_backup(file).await?;
            print_backup_verification(file, &verification);
            Ok(verification.valid)
        }
        None => {
            let dest = args
                .out
                .clone()
                .unwrap_or_else(|| default_backup_path(storage));
            let pool = initialize_database(&storage.database_url).await?;
            let custody = CustodyLog::new(pool);
            let manifest = backup(&custody, &dest).await;
            custody.pool().close().await;
            let manifest = manifest?;
            print_backup_manifest(&dest, &manifest);
            Ok(manifest.chain_valid)
        }
    }
}

async fn backup(custody: &CustodyLog, dest: &Path) -> anyhow::Result<BackupManifest> {
    let manifest = create_backup(custody.pool(), dest).await?;
    custody
        .append(
            CustodyEvent::new(
                SYSTEM_ACTOR,
                actions::CUSTODY_BACKUP,
                "database",
                &manifest.file_name,
            )
            .with_detail(json!({
                "via": "cli",
                "path": dest.display().to_string(),
                "sha256": manifest.sha256,
                "head_seq": manifest.head_seq,
            })),
        )
        .await?;
    Ok(manifest)
}

/// Execute the restore command
pub async fn execute_restore(args: &RestoreArgs, storage: &StorageConfig) -> anyhow::Result<bool> {
    let Some(target) = storage.database_path() else {
        anyhow::bail!(
            "Cannot restore into {}: not a file database",
            storage.database_url
        );
    };
    let outcome = restore_backup(&args.from, &target, args.force).await?;
    println!(
        "Restored {} -> {}",
        outcome.restored_from.display(),
        outcome.target.display()
    );
    if let Some(previous) = &outcome.moved_aside {
        println!("Previous database kept at {}", previous.display());
    }
    println!(
        "custody: {} entries, head seq {} {}",
        outcome.custody_entries,
        outcome
            .head_seq
            .map(|seq| seq.to_string())
            .unwrap_or_else(|| "-".to_string()),
        outcome.head_hash.as_deref().unwrap_or("(empty)")
    );
    Ok(true)
}

fn print_backup_manifest(dest: &Path, manifest: &BackupManifest) {
    println!("Backup written to {}", dest.display());
    println!("  sha256: {}", manifest.sha256);
    println!("  bytes: {}", manifest.bytes);
    println!("  custody entries: {}", manifest.custody_entries);
    if !manifest.chain_valid {
        println!("WARNING: the custody chain in this backup does not verify");
    }
}

fn print_backup_verification(file: &Path, verification: &BackupVerification) {
    if verification.valid {
        println!("OK: {} matches its manifest", file.display());
    } else {
        println!("FAILED: {} does not match its manifest", file.display());
        for problem in &verification.problems {
            println!("  - {}", problem);
        }
    }
    print_chain_result(&verification.chain);
}
