//! カストディログの型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// カストディログのエントリ（追記専用、ハッシュチェーンで連結）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyEntry {
    /// 連番（1始まり、欠番なし）
    pub seq: i64,
    /// 記録時刻（マイクロ秒精度）
    pub timestamp: DateTime<Utc>,
    /// 操作したユーザー名（システム操作は`system`）
    pub actor: String,
    /// 操作名（`tool.create`など）
    pub action: String,
    /// 対象エンティティ種別
    pub entity_type: String,
    /// 対象エンティティID
    pub entity_id: String,
    /// 追加情報（JSON文字列）
    pub detail: Option<String>,
    /// 直前エントリのハッシュ（先頭はGENESIS_HASH）
    pub prev_hash: String,
    /// このエントリのハッシュ
    pub hash: String,
}

/// 連番付与前のイベント
#[derive(Debug, Clone, PartialEq)]
pub struct CustodyEvent {
    /// 操作したユーザー名
    pub actor: String,
    /// 操作名
    pub action: String,
    /// 対象エンティティ種別
    pub entity_type: String,
    /// 対象エンティティID
    pub entity_id: String,
    /// 追加情報（JSON文字列）
    pub detail: Option<String>,
}

impl CustodyEvent {
    /// 追加情報なしのイベントを作る
    pub fn new(
        actor: impl Into<String>,
        action: &str,
        entity_type: &str,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            actor: actor.into(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            detail: None,
        }
    }

    /// 追加情報をJSONで付ける
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

/// チェーンの末尾
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyHead {
    /// 末尾の連番
    pub seq: i64,
    /// 末尾のハッシュ
    pub hash: String,
}

/// カストディログ検索フィルタ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustodyFilter {
    /// 操作者でフィルタ
    pub actor: Option<String>,
    /// 操作名でフィルタ
    pub action: Option<String>,
    /// エンティティ種別でフィルタ
    pub entity_type: Option<String>,
    /// エンティティIDでフィルタ
    pub entity_id: Option<String>,
    /// 開始日時
    pub time_from: Option<DateTime<Utc>>,
    /// 終了日時
    pub time_to: Option<DateTime<Utc>>,
    /// ページ番号（1始まり）
    pub page: Option<i64>,
    /// ページあたり件数
    pub per_page: Option<i64>,
}

/// チェーン検証結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    /// 検証が成功したか
    pub valid: bool,
    /// 検証したエントリ数
    pub entries_checked: i64,
    /// 最初に不整合を検出した連番
    pub first_invalid_seq: Option<i64>,
    /// 検証済み末尾のハッシュ
    pub head_hash: Option<String>,
    /// 詳細メッセージ
    pub message: Option<String>,
}

/// 操作名
pub mod actions {
    #![allow(missing_docs)]

    pub const USER_CREATE: &str = "user.create";
    pub const USER_UPDATE: &str = "user.update";
    pub const USER_DELETE: &str = "user.delete";
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const AUTH_PASSWORD_CHANGE: &str = "auth.password_change";
    pub const TOOL_CREATE: &str = "tool.create";
    pub const TOOL_UPDATE: &str = "tool.update";
    pub const TOOL_STATUS: &str = "tool.status";
    pub const TOOL_RETIRE: &str = "tool.retire";
    pub const CHECKOUT_CREATE: &str = "checkout.create";
    pub const CHECKOUT_RETURN: &str = "checkout.return";
    pub const CHEMICAL_CREATE: &str = "chemical.create";
    pub const CHEMICAL_UPDATE: &str = "chemical.update";
    pub const CHEMICAL_ISSUE: &str = "chemical.issue";
    pub const KIT_CREATE: &str = "kit.create";
    pub const KIT_ITEM_ADD: &str = "kit.item_add";
    pub const KIT_ITEM_REMOVE: &str = "kit.item_remove";
    pub const ORDER_CREATE: &str = "order.create";
    pub const ORDER_STATUS: &str = "order.status";
    pub const CUSTODY_EXPORT: &str = "custody.export";
    pub const CUSTODY_BACKUP: &str = "custody.backup";
}

/// サーバー自身が行う操作のactor
pub const SYSTEM_ACTOR: &str = "system";
