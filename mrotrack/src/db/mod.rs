//! データベースアクセス層
//!
//! SQLiteベースのデータ永続化。
//!
//! 更新系の関数は`&mut SqliteConnection`を受け取るため、呼び出し側は
//! ドメインの変更とカストディログへの追記を同じトランザクションにまとめられる。

use crate::common::error::{TrackerError, TrackerResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Timelike, Utc};

/// ユーザー管理
pub mod users;

/// 工具
pub mod tools;

/// 化学品と払出記録
pub mod chemicals;

/// キット
pub mod kits;

/// 工具の貸出・返却
pub mod checkouts;

/// 調達オーダー
pub mod orders;

/// カストディログストレージ
pub mod custody;

/// データベースマイグレーション
pub mod migrations;

/// タイムスタンプを保存用の文字列にする（RFC 3339、マイクロ秒精度、UTC）
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 現在時刻（保存精度に丸めたもの）
///
/// 保存した文字列から復元した値と一致させるためマイクロ秒で切り捨てる。
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> TrackerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TrackerError::Database(format!("Invalid {field} '{value}': {e}")))
}

pub(crate) fn parse_optional_timestamp(
    field: &str,
    value: Option<&str>,
) -> TrackerResult<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(field, v)).transpose()
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_optional_date(
    field: &str,
    value: Option<&str>,
) -> TrackerResult<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map_err(|e| TrackerError::Database(format!("Invalid {field} '{v}': {e}")))
        })
        .transpose()
}

pub(crate) fn parse_uuid(field: &str, value: &str) -> TrackerResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| TrackerError::Database(format!("Invalid {field} '{value}': {e}")))
}
