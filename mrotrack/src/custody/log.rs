//! カストディログへの追記
//!
//! 追記はプロセス内の非同期Mutexで直列化し、ドメインの変更と同じ
//! トランザクションで行う。コミットされればドメインの変更とエントリが
//! 同時に見え、ロールバックされればどちらも残らない。

use crate::common::error::{TrackerError, TrackerResult};
use crate::custody::hash_chain::{compute_entry_hash, verify_chain, GENESIS_HASH};
use crate::custody::types::{ChainVerificationResult, CustodyEntry, CustodyEvent};
use crate::db::custody::{self as storage, CustodyStorage};
use crate::db::now;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

/// 追記専用のカストディログ
#[derive(Clone)]
pub struct CustodyLog {
    pool: SqlitePool,
    append_lock: Arc<Mutex<()>>,
}

impl CustodyLog {
    /// 新しいログハンドルを作成
    ///
    /// 同じデータベースに書き込むハンドルはすべてこの値のクローンを使うこと。
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 接続プール
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 読み出し用ストレージ
    pub fn storage(&self) -> CustodyStorage {
        CustodyStorage::new(self.pool.clone())
    }

    /// 追記ロックを取ってトランザクションを開始する
    pub async fn begin(&self) -> TrackerResult<CustodyTransaction> {
        let guard = self.append_lock.clone().lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to begin transaction: {}", e)))?;
        Ok(CustodyTransaction {
            tx,
            appended: Vec::new(),
            _guard: guard,
        })
    }

    /// 単独のイベントを追記してコミットする
    pub async fn append(&self, event: CustodyEvent) -> TrackerResult<CustodyEntry> {
        let mut tx = self.begin().await?;
        let entry = tx.append(event).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// チェーン全体を検証する
    pub async fn verify(&self) -> TrackerResult<ChainVerificationResult> {
        verify_chain(&self.storage()).await
    }
}

/// 追記ロックを保持したトランザクション
///
/// `SqliteConnection`としても使えるので、db層の関数に`&mut tx`で渡せる。
pub struct CustodyTransaction {
    tx: Transaction<'static, Sqlite>,
    appended: Vec<CustodyEntry>,
    _guard: OwnedMutexGuard<()>,
}

impl CustodyTransaction {
    /// イベントに連番とハッシュを付けて挿入する
    pub async fn append(&mut self, event: CustodyEvent) -> TrackerResult<CustodyEntry> {
        let head = storage::head(&mut *self.tx).await?;
        let (seq, prev_hash) = match head {
            Some(head) => (head.seq + 1, head.hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let timestamp = now();
        let hash = compute_entry_hash(
            &prev_hash,
            seq,
            &timestamp,
            &event.actor,
            &event.action,
            &event.entity_type,
            &event.entity_id,
            event.detail.as_deref(),
        );
        let entry = CustodyEntry {
            seq,
            timestamp,
            actor: event.actor,
            action: event.action,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            detail: event.detail,
            prev_hash,
            hash,
        };

        storage::insert(&mut self.tx, &entry).await?;
        self.appended.push(entry.clone());
        Ok(entry)
    }

    /// ドメインの変更と追記をまとめて取り消す
    pub async fn rollback(self) -> TrackerResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to roll back transaction: {}", e)))
    }

    /// コミットして追記したエントリを返す
    pub async fn commit(self) -> TrackerResult<Vec<CustodyEntry>> {
        self.tx
            .commit()
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to commit transaction: {}", e)))?;

        for entry in &self.appended {
            info!(
                seq = entry.seq,
                action = %entry.action,
                entity = %format!("{}:{}", entry.entity_type, entry.entity_id),
                actor = %entry.actor,
                "Custody entry appended"
            );
        }
        Ok(self.appended)
    }
}

impl Deref for CustodyTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for CustodyTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}
