//! 共通型定義

/// 認証関連のデータモデル
pub mod auth;

/// エラー型
pub mod error;

/// 在庫ドメインの型
pub mod types;
