//! カストディ（保管履歴）
//!
//! 在庫に対するすべての変更を追記専用・ハッシュチェーン付きのログに記録し、
//! CSVエクスポートとSQLiteバックアップで外部に持ち出せるようにする。

use crate::common::error::{TrackerError, TrackerResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// 型定義
pub mod types;

/// SHA-256ハッシュチェーン
pub mod hash_chain;

/// 追記
pub mod log;

/// CSVエクスポート
pub mod export;

/// バックアップとリストア
pub mod backup;

pub use hash_chain::{verify_chain, GENESIS_HASH};
pub use log::{CustodyLog, CustodyTransaction};
pub use types::{actions, ChainVerificationResult, CustodyEntry, CustodyEvent, CustodyFilter};

/// バイト列のSHA-256（小文字16進）
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// ファイルのSHA-256（小文字16進）とバイト数
pub async fn sha256_file(path: &Path) -> TrackerResult<(String, u64)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let bytes = std::io::copy(&mut file, &mut hasher)?;
        Ok::<_, TrackerError>((format!("{:x}", hasher.finalize()), bytes))
    })
    .await
    .map_err(|e| TrackerError::Internal(format!("Hashing task failed: {}", e)))?
}
