//! ユーザー管理API
//!
//! Admin専用のユーザーCRUD操作

use super::error::AppError;
use crate::auth::middleware::require_role;
use crate::auth::password::{hash_password, validate_new_password};
use crate::common::auth::{Claims, User, UserRole};
use crate::common::error::TrackerError;
use crate::custody::{actions, CustodyEvent};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// 自動生成パスワードの長さ
const GENERATED_PASSWORD_LENGTH: usize = 16;

/// ユーザー作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// ユーザー名
    pub username: String,
    /// ロール
    pub role: UserRole,
    /// 初期パスワード（省略時は自動生成）
    #[serde(default)]
    pub password: Option<String>,
}

/// ユーザー作成レスポンス
#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    /// ユーザー情報
    pub user: User,
    /// 自動生成されたパスワード（管理者に一度だけ表示）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}

/// ユーザー更新リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    /// ユーザー名
    pub username: Option<String>,
    /// ロール
    pub role: Option<UserRole>,
    /// パスワードのリセット（次回ログイン時に変更必須になる）
    pub password: Option<String>,
}

/// ユーザー一覧レスポンス
#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    /// ユーザー一覧
    pub users: Vec<User>,
}

fn validate_username(username: &str) -> Result<(), TrackerError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::validation("Username must not be empty"));
    }
    if trimmed != username {
        return Err(TrackerError::validation(
            "Username must not have leading or trailing spaces",
        ));
    }
    Ok(())
}

/// GET /api/users - ユーザー一覧取得
pub async fn list_users(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
) -> Result<Json<ListUsersResponse>, AppError> {
    require_role(&claims, UserRole::Admin)?;
    let users = crate::db::users::list(&app_state.db_pool).await?;
    Ok(Json(ListUsersResponse { users }))
}

/// POST /api/users - ユーザー作成
///
/// # Returns
/// * `201 Created` - 作成されたユーザー
/// * `409 Conflict` - ユーザー名重複
pub async fn create_user(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), AppError> {
    require_role(&claims, UserRole::Admin)?;
    validate_username(&request.username)?;

    let (password, generated_password) = match request.password {
        Some(password) => {
            validate_new_password(&password)?;
            (password, None)
        }
        None => {
            let generated = crate::auth::generate_random_token(GENERATED_PASSWORD_LENGTH);
            (generated.clone(), Some(generated))
        }
    };
    let password_hash = hash_password(&password)?;

    // 管理者が決めたパスワードは本人に変更させる
    let mut tx = app_state.custody.begin().await?;
    let user = crate::db::users::create(
        &mut tx,
        &request.username,
        &password_hash,
        request.role,
        true,
    )
    .await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::USER_CREATE, "user", user.id)
            .with_detail(json!({"username": user.username, "role": user.role})),
    )
    .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user,
            generated_password,
        }),
    ))
}

/// PUT /api/users/:id - ユーザー更新
///
/// 最後の管理者は降格できない。
pub async fn update_user(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    require_role(&claims, UserRole::Admin)?;
    if let Some(username) = request.username.as_deref() {
        validate_username(username)?;
    }
    let password_hash = match request.password.as_deref() {
        Some(password) => {
            validate_new_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let mut tx = app_state.custody.begin().await?;
    let before = crate::db::users::find_by_id(&mut *tx, user_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("user {}", user_id)))?;

    let demoting = matches!(request.role, Some(role) if role != UserRole::Admin);
    if demoting && crate::db::users::is_last_admin(&mut tx, user_id).await? {
        tx.rollback().await?;
        return Err(TrackerError::validation("Cannot demote the last administrator").into());
    }

    let mut user =
        crate::db::users::update(&mut tx, user_id, request.username.as_deref(), request.role)
            .await?;
    if let Some(hash) = password_hash.as_deref() {
        crate::db::users::update_password(&mut tx, user_id, hash, true).await?;
        user.must_change_password = true;
    }

    tx.append(
        CustodyEvent::new(&claims.username, actions::USER_UPDATE, "user", user_id).with_detail(
            json!({
                "username": {"from": before.username, "to": user.username},
                "role": {"from": before.role, "to": user.role},
                "password_reset": password_hash.is_some(),
            }),
        ),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(user))
}

/// DELETE /api/users/:id - ユーザー削除
///
/// 最後の管理者と、貸出・払出履歴のあるユーザーは削除できない。
pub async fn delete_user(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&claims, UserRole::Admin)?;

    let mut tx = app_state.custody.begin().await?;
    let user = crate::db::users::find_by_id(&mut *tx, user_id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("user {}", user_id)))?;

    if crate::db::users::is_last_admin(&mut tx, user_id).await? {
        tx.rollback().await?;
        return Err(TrackerError::validation("Cannot delete the last administrator").into());
    }

    crate::db::users::delete(&mut tx, user_id).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::USER_DELETE, "user", user_id)
            .with_detail(json!({"username": user.username, "role": user.role})),
    )
    .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
