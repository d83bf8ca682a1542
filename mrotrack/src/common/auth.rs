//! 認証関連のデータモデル

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ユーザーロール
///
/// 権限の強さは `Admin` > `Technician` > `Viewer`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// 管理者（全操作可能）
    Admin,
    /// 技術者（貸出・返却、化学品払出、調達依頼）
    Technician,
    /// 閲覧者（読み取りのみ）
    Viewer,
}

impl UserRole {
    fn rank(self) -> u8 {
        match self {
            UserRole::Admin => 2,
            UserRole::Technician => 1,
            UserRole::Viewer => 0,
        }
    }

    /// このロールが`required`以上の権限を持つか
    pub fn allows(self, required: UserRole) -> bool {
        self.rank() >= required.rank()
    }

    /// DB保存用の文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Technician => "technician",
            UserRole::Viewer => "viewer",
        }
    }

    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "technician" => Some(UserRole::Technician),
            "viewer" => Some(UserRole::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ユーザー
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// ユーザーID
    pub id: Uuid,
    /// ユーザー名
    pub username: String,
    /// パスワードハッシュ（bcrypt）
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// ユーザーロール
    pub role: UserRole,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 最終ログイン日時
    pub last_login: Option<DateTime<Utc>>,
    /// 次回ログイン時にパスワード変更が必要か
    pub must_change_password: bool,
}

/// JWTクレーム
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザーID（JWT sub claim）
    pub sub: String,
    /// ユーザー名（監査ログのactorに使う）
    pub username: String,
    /// ユーザーロール
    pub role: UserRole,
    /// 有効期限（Unix timestamp、JWT exp claim）
    pub exp: usize,
    /// パスワード変更が必要か
    #[serde(default)]
    pub must_change_password: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(UserRole::Admin.allows(UserRole::Admin));
        assert!(UserRole::Admin.allows(UserRole::Technician));
        assert!(UserRole::Admin.allows(UserRole::Viewer));
        assert!(UserRole::Technician.allows(UserRole::Viewer));
        assert!(!UserRole::Technician.allows(UserRole::Admin));
        assert!(!UserRole::Viewer.allows(UserRole::Technician));
    }

    #[test]
    fn test_role_string_round_trip() {
        for role in [UserRole::Admin, UserRole::Technician, UserRole::Viewer] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("superuser"), None);
    }

    #[test]
    fn test_user_serialization_omits_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "mechanic".into(),
            password_hash: "$2b$12$secret".into(),
            role: UserRole::Technician,
            created_at: Utc::now(),
            last_login: None,
            must_change_password: false,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "technician");
    }
}
