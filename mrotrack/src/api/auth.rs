//! 認証API
//!
//! ログイン、自分の情報、パスワード変更

use super::error::AppError;
use crate::auth::jwt::{create_jwt, JWT_EXPIRATION_HOURS};
use crate::auth::password::{hash_password, validate_new_password, verify_password};
use crate::common::auth::{Claims, User, UserRole};
use crate::common::error::TrackerError;
use crate::custody::{actions, CustodyEvent};
use crate::AppState;
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// ユーザー名
    pub username: String,
    /// パスワード
    pub password: String,
}

/// ログインレスポンス
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// JWTトークン
    pub token: String,
    /// 有効期限（秒）
    pub expires_in: i64,
    /// ユーザー情報
    pub user: UserInfo,
}

/// ユーザー情報
#[derive(Debug, Serialize)]
pub struct UserInfo {
    /// ユーザーID
    pub id: Uuid,
    /// ユーザー名
    pub username: String,
    /// ロール
    pub role: UserRole,
    /// パスワード変更が必要か
    pub must_change_password: bool,
    /// 最終ログイン日時
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        UserInfo {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            must_change_password: user.must_change_password,
            last_login: user.last_login,
        }
    }
}

/// パスワード変更リクエスト
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    /// 現在のパスワード
    pub current_password: String,
    /// 新しいパスワード
    pub new_password: String,
}

fn invalid_credentials() -> AppError {
    AppError(TrackerError::Authentication(
        "Invalid username or password".to_string(),
    ))
}

pub(crate) fn subject_id(claims: &Claims) -> Result<Uuid, TrackerError> {
    Uuid::parse_str(&claims.sub)
        .map_err(|_| TrackerError::Authentication("Invalid token subject".to_string()))
}

fn login_response(user: &User, secret: &str) -> Result<LoginResponse, TrackerError> {
    Ok(LoginResponse {
        token: create_jwt(user, secret)?,
        expires_in: JWT_EXPIRATION_HOURS * 3600,
        user: UserInfo::from(user),
    })
}

/// POST /api/auth/login - ログイン
///
/// # Returns
/// * `200 OK` - JWTとユーザー情報
/// * `401 Unauthorized` - ユーザー名またはパスワードが違う
pub async fn login(
    State(app_state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let Some(user) = crate::db::users::find_by_username(&app_state.db_pool, &request.username).await?
    else {
        tracing::warn!(username = %request.username, "Login failed: unknown user");
        return Err(invalid_credentials());
    };

    if !verify_password(&request.password, &user.password_hash)? {
        tracing::warn!(username = %request.username, "Login failed: wrong password");
        return Err(invalid_credentials());
    }

    let mut tx = app_state.custody.begin().await?;
    crate::db::users::update_last_login(&mut tx, user.id).await?;
    tx.append(CustodyEvent::new(
        &user.username,
        actions::AUTH_LOGIN,
        "user",
        user.id,
    ))
    .await?;
    tx.commit().await?;

    Ok(Json(login_response(&user, &app_state.jwt_secret)?))
}

/// GET /api/auth/me - 認証済みユーザーの情報
pub async fn me(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
) -> Result<Json<UserInfo>, AppError> {
    let user_id = subject_id(&claims)?;
    let user = crate::db::users::find_by_id(&app_state.db_pool, user_id)
        .await?
        .ok_or_else(|| TrackerError::Authentication("User no longer exists".to_string()))?;
    Ok(Json(UserInfo::from(&user)))
}

/// PUT /api/auth/password - 自分のパスワード変更
///
/// 成功すると`must_change_password`が外れた新しいトークンを返す。
pub async fn change_password(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user_id = subject_id(&claims)?;
    let user = crate::db::users::find_by_id(&app_state.db_pool, user_id)
        .await?
        .ok_or_else(|| TrackerError::Authentication("User no longer exists".to_string()))?;

    if !verify_password(&request.current_password, &user.password_hash)? {
        return Err(AppError(TrackerError::Authentication(
            "Current password is incorrect".to_string(),
        )));
    }
    if request.new_password == request.current_password {
        return Err(TrackerError::validation("New password must differ from the current one").into());
    }
    validate_new_password(&request.new_password)?;
    let password_hash = hash_password(&request.new_password)?;

    let mut tx = app_state.custody.begin().await?;
    crate::db::users::update_password(&mut tx, user_id, &password_hash, false).await?;
    tx.append(CustodyEvent::new(
        &claims.username,
        actions::AUTH_PASSWORD_CHANGE,
        "user",
        user_id,
    ))
    .await?;
    tx.commit().await?;

    let user = User {
        password_hash,
        must_change_password: false,
        ..user
    };
    Ok(Json(login_response(&user, &app_state.jwt_secret)?))
}
