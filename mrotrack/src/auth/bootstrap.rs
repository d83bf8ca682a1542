//! 初回起動時の管理者アカウント作成
//!
//! 環境変数、対話式、自動生成の順で管理者の資格情報を決める。

use crate::auth::password::{hash_password, validate_new_password};
use crate::common::auth::{User, UserRole};
use crate::common::error::{TrackerError, TrackerResult};
use crate::config::{get_env_with_fallback, get_env_with_fallback_or};
use crate::custody::types::{actions, SYSTEM_ACTOR};
use crate::custody::{CustodyEvent, CustodyLog};
use crate::db;
use serde_json::json;
use std::io::{self, IsTerminal, Write};

/// 自動生成パスワードの長さ
const GENERATED_PASSWORD_LENGTH: usize = 20;

/// 管理者の資格情報の出所
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminSource {
    /// MROTRACK_ADMIN_PASSWORD
    Environment,
    /// 端末からの入力
    Interactive,
    /// 自動生成（初回ログイン時に変更が必要）
    Generated,
}

impl AdminSource {
    fn as_str(&self) -> &'static str {
        match self {
            AdminSource::Environment => "environment",
            AdminSource::Interactive => "interactive",
            AdminSource::Generated => "generated",
        }
    }
}

/// 管理者の資格情報
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    /// ユーザー名
    pub username: String,
    /// 平文パスワード
    pub password: String,
    /// 出所
    pub source: AdminSource,
}

/// 環境変数から資格情報を読む
///
/// # Environment Variables
/// * `MROTRACK_ADMIN_USERNAME` - 管理者ユーザー名（省略時: "admin"）
/// * `MROTRACK_ADMIN_PASSWORD` - 管理者パスワード
pub fn credentials_from_env() -> Option<AdminCredentials> {
    let password = match get_env_with_fallback("MROTRACK_ADMIN_PASSWORD", "ADMIN_PASSWORD") {
        Some(p) if !p.is_empty() => p,
        _ => {
            tracing::debug!("MROTRACK_ADMIN_PASSWORD not set");
            return None;
        }
    };
    let username = get_env_with_fallback_or("MROTRACK_ADMIN_USERNAME", "ADMIN_USERNAME", "admin");
    Some(AdminCredentials {
        username,
        password,
        source: AdminSource::Environment,
    })
}

fn credentials_interactive() -> TrackerResult<AdminCredentials> {
    println!("\n=== Initial Setup: Create Admin User ===");

    print!("Enter admin username (default: admin): ");
    let _ = io::stdout().flush(); // 対話UIなので失敗は無視
    let mut username = String::new();
    io::stdin()
        .read_line(&mut username)
        .map_err(|e| TrackerError::Internal(format!("Failed to read username: {}", e)))?;
    let username = match username.trim() {
        "" => "admin".to_string(),
        name => name.to_string(),
    };

    let password = rpassword::prompt_password("Enter admin password: ")
        .map_err(|e| TrackerError::Internal(format!("Failed to read password: {}", e)))?;
    let confirm = rpassword::prompt_password("Confirm admin password: ")
        .map_err(|e| TrackerError::Internal(format!("Failed to read password: {}", e)))?;
    if password != confirm {
        return Err(TrackerError::validation("Passwords do not match"));
    }
    validate_new_password(&password)?;

    Ok(AdminCredentials {
        username,
        password,
        source: AdminSource::Interactive,
    })
}

fn credentials_generated() -> AdminCredentials {
    AdminCredentials {
        username: get_env_with_fallback_or("MROTRACK_ADMIN_USERNAME", "ADMIN_USERNAME", "admin"),
        password: crate::auth::generate_random_token(GENERATED_PASSWORD_LENGTH),
        source: AdminSource::Generated,
    }
}

/// 資格情報を決める
///
/// 環境変数があればそれを使い、なければ`interactive`のとき端末で入力を求め、
/// それ以外は生成する。
pub fn resolve_credentials(interactive: bool) -> TrackerResult<AdminCredentials> {
    if let Some(credentials) = credentials_from_env() {
        return Ok(credentials);
    }
    if interactive {
        return credentials_interactive();
    }
    Ok(credentials_generated())
}

/// 管理者を作成し、カストディログに記録する
pub async fn create_admin(
    custody: &CustodyLog,
    credentials: &AdminCredentials,
) -> TrackerResult<User> {
    let password_hash = hash_password(&credentials.password)?;
    let must_change_password = credentials.source == AdminSource::Generated;

    let mut tx = custody.begin().await?;
    let user = db::users::create(
        &mut tx,
        &credentials.username,
        &password_hash,
        UserRole::Admin,
        must_change_password,
    )
    .await?;
    tx.append(
        CustodyEvent::new(SYSTEM_ACTOR, actions::USER_CREATE, "user", user.id).with_detail(json!({
            "username": user.username,
            "role": user.role,
            "bootstrap": credentials.source.as_str(),
        })),
    )
    .await?;
    tx.commit().await?;

    Ok(user)
}

/// 初回起動時の管理者作成処理（入力方法を指定）
pub async fn ensure_admin_exists_with(
    custody: &CustodyLog,
    interactive: bool,
) -> TrackerResult<Option<User>> {
    if !db::users::is_first_boot(custody.pool()).await? {
        tracing::debug!("Users already exist, skipping admin creation");
        return Ok(None);
    }

    tracing::info!("First boot detected, creating admin user");
    let credentials = resolve_credentials(interactive)?;
    let user = create_admin(custody, &credentials).await?;

    if credentials.source == AdminSource::Generated {
        // 生成したパスワードはここでしか表示しない
        println!("\n=== Initial admin account ===");
        println!("  username: {}", user.username);
        println!("  password: {}", credentials.password);
        println!("The password must be changed at first login.\n");
    }
    tracing::info!(
        username = %user.username,
        source = credentials.source.as_str(),
        "Created initial admin user"
    );
    Ok(Some(user))
}

/// 初回起動時の管理者作成処理
///
/// ユーザーが1人もいなければ管理者を作る。標準入力が端末なら対話式で尋ねる。
pub async fn ensure_admin_exists(custody: &CustodyLog) -> TrackerResult<Option<User>> {
    ensure_admin_exists_with(custody, io::stdin().is_terminal()).await
}
