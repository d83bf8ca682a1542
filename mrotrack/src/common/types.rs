//! 在庫ドメインの型定義
//!
//! 工具・化学品・キット・貸出・調達オーダー。状態遷移のルールもここに置く。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 工具の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// 貸出可能
    Available,
    /// 貸出中
    CheckedOut,
    /// 校正・修理中
    Maintenance,
    /// 廃棄済み（終端）
    Retired,
}

impl ToolStatus {
    /// DB保存用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::CheckedOut => "checked_out",
            Self::Maintenance => "maintenance",
            Self::Retired => "retired",
        }
    }

    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "checked_out" => Some(Self::CheckedOut),
            "maintenance" => Some(Self::Maintenance),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }

    /// 手動の状態変更として許可されるか
    ///
    /// `CheckedOut`への出入りは貸出・返却操作だけが行う。
    pub fn can_transition_to(self, next: ToolStatus) -> bool {
        matches!(
            (self, next),
            (Self::Available, Self::Maintenance)
                | (Self::Maintenance, Self::Available)
                | (Self::Available, Self::Retired)
                | (Self::Maintenance, Self::Retired)
        )
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工具
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// 工具ID
    pub id: i64,
    /// 管理番号（一意）
    pub tool_number: String,
    /// シリアル番号
    pub serial_number: Option<String>,
    /// 説明
    pub description: String,
    /// 分類
    pub category: Option<String>,
    /// 保管場所
    pub location: Option<String>,
    /// 外観・状態メモ
    pub condition: Option<String>,
    /// 状態
    pub status: ToolStatus,
    /// 次回校正期限
    pub calibration_due: Option<NaiveDate>,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 更新日時
    pub updated_at: DateTime<Utc>,
}

/// 化学品数量を保存する小数桁数
pub const QUANTITY_DECIMALS: i32 = 6;

/// 数量を保存桁数に丸める
///
/// 保存する数量、払出の減算、在庫ゼロの判定はすべてこの桁で丸めた値を使う。
pub fn round_quantity(quantity: f64) -> f64 {
    let scale = 10f64.powi(QUANTITY_DECIMALS);
    (quantity * scale).round() / scale
}

/// 化学品の在庫状態（数量と期限から導出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChemicalStatus {
    /// 使用可能
    Available,
    /// 最低在庫以下
    LowStock,
    /// 在庫ゼロ
    Depleted,
    /// 期限切れ
    Expired,
}

impl ChemicalStatus {
    /// 状態を導出する（expired > depleted > low_stock > available）
    pub fn derive(
        quantity: f64,
        minimum_stock_level: Option<f64>,
        expiration_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Self {
        if expiration_date.is_some_and(|d| d < today) {
            return Self::Expired;
        }
        if round_quantity(quantity) <= 0.0 {
            return Self::Depleted;
        }
        if minimum_stock_level.is_some_and(|min| quantity <= min) {
            return Self::LowStock;
        }
        Self::Available
    }
}

/// 化学品（ロット単位）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chemical {
    /// 化学品ID
    pub id: i64,
    /// 部品番号
    pub part_number: String,
    /// ロット番号
    pub lot_number: String,
    /// 説明
    pub description: String,
    /// メーカー
    pub manufacturer: Option<String>,
    /// 在庫数量
    pub quantity: f64,
    /// 単位（ml、kg 等）
    pub unit: String,
    /// 保管場所
    pub location: Option<String>,
    /// 最低在庫数量
    pub minimum_stock_level: Option<f64>,
    /// 使用期限
    pub expiration_date: Option<NaiveDate>,
    /// 読み出し時点で導出した状態
    pub status: ChemicalStatus,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 更新日時
    pub updated_at: DateTime<Utc>,
}

/// 化学品の払出記録
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemicalIssuance {
    /// 払出ID
    pub id: i64,
    /// 化学品ID
    pub chemical_id: i64,
    /// 受領者
    pub user_id: Uuid,
    /// 払出数量
    pub quantity: f64,
    /// 用途（作業指示番号など）
    pub purpose: Option<String>,
    /// 払出日時
    pub issued_at: DateTime<Utc>,
}

/// キット構成品の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitItemType {
    /// 工具
    Tool,
    /// 化学品
    Chemical,
}

impl KitItemType {
    /// DB保存用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Chemical => "chemical",
        }
    }

    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(Self::Tool),
            "chemical" => Some(Self::Chemical),
            _ => None,
        }
    }
}

/// キット構成品
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitItem {
    /// 構成品ID
    pub id: i64,
    /// 所属キットID
    pub kit_id: i64,
    /// 種別
    pub item_type: KitItemType,
    /// 参照先（tools.id または chemicals.id）
    pub item_id: i64,
    /// 数量
    pub quantity: f64,
    /// 追加日時
    pub added_at: DateTime<Utc>,
}

/// キット（機種別の工具・化学品セット）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kit {
    /// キットID
    pub id: i64,
    /// キット名（一意）
    pub name: String,
    /// 対象機種
    pub aircraft_type: Option<String>,
    /// 説明
    pub description: Option<String>,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 構成品
    pub items: Vec<KitItem>,
}

/// 工具の貸出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    /// 貸出ID
    pub id: i64,
    /// 工具ID
    pub tool_id: i64,
    /// 借用者
    pub user_id: Uuid,
    /// 貸出日時
    pub checked_out_at: DateTime<Utc>,
    /// 返却予定日
    pub expected_return_date: Option<NaiveDate>,
    /// 返却日時（未返却ならNone）
    pub returned_at: Option<DateTime<Utc>>,
    /// 返却時の状態（`damaged`なら工具はmaintenanceへ）
    pub return_condition: Option<String>,
    /// 備考
    pub notes: Option<String>,
}

impl Checkout {
    /// 未返却か
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    /// `today`時点で返却予定日を過ぎているか
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && self.expected_return_date.is_some_and(|d| d < today)
    }
}

/// 調達オーダー種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// 工具
    Tool,
    /// 化学品
    Chemical,
    /// 消耗品
    Expendable,
    /// その他
    Other,
}

impl OrderType {
    /// DB保存用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Chemical => "chemical",
            Self::Expendable => "expendable",
            Self::Other => "other",
        }
    }

    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(Self::Tool),
            "chemical" => Some(Self::Chemical),
            "expendable" => Some(Self::Expendable),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// 調達オーダー優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPriority {
    /// 低
    Low,
    /// 通常
    #[default]
    Normal,
    /// 高
    High,
    /// 緊急（AOG等）
    Critical,
}

impl OrderPriority {
    /// DB保存用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// 調達オーダーの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// 起票
    New,
    /// 発注済み
    Ordered,
    /// 出荷済み
    Shipped,
    /// 受領（終端）
    Received,
    /// 取消（終端）
    Cancelled,
}

impl OrderStatus {
    /// DB保存用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Ordered => "ordered",
            Self::Shipped => "shipped",
            Self::Received => "received",
            Self::Cancelled => "cancelled",
        }
    }

    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "ordered" => Some(Self::Ordered),
            "shipped" => Some(Self::Shipped),
            "received" => Some(Self::Received),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// 終端状態か
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Received | Self::Cancelled)
    }

    /// 遷移が許可されるか
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Ordered)
                | (Self::New, Self::Cancelled)
                | (Self::Ordered, Self::Shipped)
                | (Self::Ordered, Self::Received)
                | (Self::Ordered, Self::Cancelled)
                | (Self::Shipped, Self::Received)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 調達オーダー
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcurementOrder {
    /// オーダーID
    pub id: i64,
    /// 件名
    pub title: String,
    /// 種別
    pub order_type: OrderType,
    /// 部品番号
    pub part_number: Option<String>,
    /// 説明
    pub description: Option<String>,
    /// 数量
    pub quantity: f64,
    /// 単位
    pub unit: Option<String>,
    /// 優先度
    pub priority: OrderPriority,
    /// 状態
    pub status: OrderStatus,
    /// 依頼者
    pub requested_by: Uuid,
    /// 必要日
    pub needed_by: Option<NaiveDate>,
    /// 仕入先
    pub vendor: Option<String>,
    /// 追跡番号
    pub tracking_number: Option<String>,
    /// 備考
    pub notes: Option<String>,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 発注日時
    pub ordered_at: Option<DateTime<Utc>>,
    /// 受領日時
    pub received_at: Option<DateTime<Utc>>,
    /// 更新日時
    pub updated_at: DateTime<Utc>,
}
