//! mrotrack Server
//!
//! MRO（整備・修理・運用）在庫の追跡サーバー。工具、化学品、キット、貸出、
//! ユーザー、調達依頼を管理し、すべての変更をハッシュチェーン付きの
//! カストディログに記録する。

#![warn(missing_docs)]

/// 共通型定義
pub mod common;

/// REST APIハンドラー
pub mod api;

/// データベースアクセス
pub mod db;

/// カストディログ（ハッシュチェーン、エクスポート、バックアップ）
pub mod custody;

/// 認証・認可
pub mod auth;

/// 環境変数による設定
pub mod config;

/// ログ初期化
pub mod logging;

/// CLIインターフェース
pub mod cli;

/// サーバー起動
pub mod server;

/// Cooperative shutdown controller
pub mod shutdown;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// データベース接続プール
    pub db_pool: sqlx::SqlitePool,
    /// JWT秘密鍵
    pub jwt_secret: String,
    /// カストディログ（追記はすべてこのハンドル経由）
    pub custody: custody::CustodyLog,
    /// ストレージ設定（バックアップ出力先など）
    pub storage: config::StorageConfig,
    /// Cooperative shutdown controller
    pub shutdown: shutdown::ShutdownController,
}

impl AppState {
    /// プールから状態を組み立てる
    pub fn new(db_pool: sqlx::SqlitePool, jwt_secret: String, storage: config::StorageConfig) -> Self {
        let custody = custody::CustodyLog::new(db_pool.clone());
        Self {
            db_pool,
            jwt_secret,
            custody,
            storage,
            shutdown: shutdown::ShutdownController::default(),
        }
    }
}
