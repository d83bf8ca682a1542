// ユーザーCRUD操作

use crate::common::auth::{User, UserRole};
use crate::common::error::{TrackerError, TrackerResult};
use crate::db::{format_timestamp, now, parse_optional_timestamp, parse_timestamp, parse_uuid};
use sqlx::{SqliteConnection, SqliteExecutor};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, username, password_hash, role, created_at, last_login, must_change_password";

/// ユーザーを作成
///
/// # Arguments
/// * `conn` - データベース接続（トランザクション可）
/// * `username` - ユーザー名
/// * `password_hash` - bcryptハッシュ化されたパスワード
/// * `role` - ユーザーロール
/// * `must_change_password` - 初回ログイン時にパスワード変更を求めるか
///
/// # Returns
/// * `Ok(User)` - 作成されたユーザー
/// * `Err(TrackerError::Conflict)` - ユーザー名重複
pub async fn create(
    conn: &mut SqliteConnection,
    username: &str,
    password_hash: &str,
    role: UserRole,
    must_change_password: bool,
) -> TrackerResult<User> {
    let id = Uuid::new_v4();
    let created_at = now();

    sqlx::query(
        "INSERT INTO users (id, username, password_hash, role, created_at, last_login, must_change_password)
         VALUES (?, ?, ?, ?, ?, NULL, ?)",
    )
    .bind(id.to_string())
    .bind(username)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(format_timestamp(&created_at))
    .bind(must_change_password as i32)
    .execute(&mut *conn)
    .await
    .map_err(|e| TrackerError::from_sqlx(&format!("Username '{}'", username), e))?;

    Ok(User {
        id,
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        role,
        created_at,
        last_login: None,
        must_change_password,
    })
}

/// ユーザー名でユーザーを検索
///
/// # Returns
/// * `Ok(Some(User))` - ユーザーが見つかった
/// * `Ok(None)` - ユーザーが見つからなかった
pub async fn find_by_username<'e, E>(executor: E, username: &str) -> TrackerResult<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to find user: {}", e)))?;

    row.map(User::try_from).transpose()
}

/// IDでユーザーを検索
pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> TrackerResult<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to find user: {}", e)))?;

    row.map(User::try_from).transpose()
}

/// すべてのユーザーを取得（ユーザー名順）
pub async fn list<'e, E>(executor: E) -> TrackerResult<Vec<User>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY username ASC"
    ))
    .fetch_all(executor)
    .await
    .map_err(|e| TrackerError::Database(format!("Failed to list users: {}", e)))?;

    rows.into_iter().map(User::try_from).collect()
}

/// ユーザー名・ロールを更新
///
/// # Arguments
/// * `conn` - データベース接続
/// * `id` - ユーザーID
/// * `username` - 新しいユーザー名（Noneの場合は変更なし）
/// * `role` - 新しいロール（Noneの場合は変更なし）
///
/// # Returns
/// * `Ok(User)` - 更新されたユーザー
/// * `Err(TrackerError::NotFound)` - ユーザーが存在しない
pub async fn update(
    conn: &mut SqliteConnection,
    id: Uuid,
    username: Option<&str>,
    role: Option<UserRole>,
) -> TrackerResult<User> {
    let current = find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("user {}", id)))?;

    let new_username = username.unwrap_or(&current.username).to_string();
    let new_role = role.unwrap_or(current.role);

    sqlx::query("UPDATE users SET username = ?, role = ? WHERE id = ?")
        .bind(&new_username)
        .bind(new_role.as_str())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| TrackerError::from_sqlx(&format!("Username '{}'", new_username), e))?;

    Ok(User {
        username: new_username,
        role: new_role,
        ..current
    })
}

/// パスワードハッシュを更新
///
/// `must_change_password`も同時に設定する。
pub async fn update_password(
    conn: &mut SqliteConnection,
    id: Uuid,
    password_hash: &str,
    must_change_password: bool,
) -> TrackerResult<()> {
    let result =
        sqlx::query("UPDATE users SET password_hash = ?, must_change_password = ? WHERE id = ?")
            .bind(password_hash)
            .bind(must_change_password as i32)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| TrackerError::Database(format!("Failed to update password: {}", e)))?;

    if result.rows_affected() == 0 {
        return Err(TrackerError::NotFound(format!("user {}", id)));
    }
    Ok(())
}

/// 最終ログイン日時を更新
pub async fn update_last_login(conn: &mut SqliteConnection, id: Uuid) -> TrackerResult<()> {
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(format_timestamp(&now()))
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to update last login: {}", e)))?;

    Ok(())
}

/// ユーザーを削除
///
/// 貸出履歴などから参照されているユーザーは削除できない（`Conflict`）。
pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> TrackerResult<()> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| TrackerError::from_sqlx(&format!("User {}", id), e))?;

    if result.rows_affected() == 0 {
        return Err(TrackerError::NotFound(format!("user {}", id)));
    }
    Ok(())
}

/// 初回起動チェック（ユーザーが0人かどうか）
pub async fn is_first_boot<'e, E>(executor: E) -> TrackerResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(executor)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to check first boot: {}", e)))?;

    Ok(count == 0)
}

/// 最後の管理者チェック（削除・降格前の検証用）
///
/// # Returns
/// * `Ok(true)` - このユーザーは最後の管理者
/// * `Ok(false)` - 管理者ではない、または他にも管理者がいる
pub async fn is_last_admin(conn: &mut SqliteConnection, user_id: Uuid) -> TrackerResult<bool> {
    let user = find_by_id(&mut *conn, user_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("user {}", user_id)))?;

    if user.role != UserRole::Admin {
        return Ok(false);
    }

    let admin_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| TrackerError::Database(format!("Failed to count admins: {}", e)))?;

    Ok(admin_count == 1)
}

// SQLiteからの行取得用の内部型
#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    password_hash: String,
    role: String,
    created_at: String,
    last_login: Option<String>,
    must_change_password: i32,
}

impl TryFrom<UserRow> for User {
    type Error = TrackerError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = UserRole::parse(&row.role)
            .ok_or_else(|| TrackerError::Database(format!("Invalid role: {}", row.role)))?;
        Ok(User {
            id: parse_uuid("user id", &row.id)?,
            username: row.username,
            password_hash: row.password_hash,
            role,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            last_login: parse_optional_timestamp("last_login", row.last_login.as_deref())?,
            must_change_password: row.must_change_password != 0,
        })
    }
}
