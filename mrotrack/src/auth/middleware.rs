// 認証ミドルウェア実装

use crate::api::error::AppError;
use crate::common::auth::{Claims, UserRole};
use crate::common::error::TrackerError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// JWT認証ミドルウェア
///
/// `Authorization: Bearer <token>`を検証し、`Claims`をリクエストの拡張データに格納する。
/// ロールとユーザー名はトークンではなく現在のユーザー行から取る。
/// 削除されたユーザーのトークンは401になる。
pub async fn jwt_auth_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            AppError(TrackerError::Authentication(
                "Missing Authorization header".to_string(),
            ))
            .into_response()
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError(TrackerError::Authentication(
            "Invalid Authorization header format".to_string(),
        ))
        .into_response()
    })?;

    // JWTを検証
    let mut claims = crate::auth::jwt::verify_jwt(token, &app_state.jwt_secret).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        AppError(e).into_response()
    })?;

    refresh_claims(&app_state, &mut claims)
        .await
        .map_err(|e| AppError(e).into_response())?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// クレームを現在のユーザー行で上書きする
async fn refresh_claims(app_state: &AppState, claims: &mut Claims) -> Result<(), TrackerError> {
    let user_id = crate::api::auth::subject_id(claims)?;
    let user = crate::db::users::find_by_id(&app_state.db_pool, user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "Token presented for a deleted user");
            TrackerError::Authentication("User no longer exists".to_string())
        })?;
    if user.role != claims.role {
        tracing::debug!(
            username = %user.username,
            token_role = %claims.role,
            current_role = %user.role,
            "Token role differs from current role"
        );
    }
    claims.username = user.username;
    claims.role = user.role;
    claims.must_change_password = user.must_change_password;
    Ok(())
}

/// クレームが必要なロール以上か確認する
pub fn require_role(claims: &Claims, required: UserRole) -> Result<(), TrackerError> {
    if claims.role.allows(required) {
        Ok(())
    } else {
        Err(TrackerError::Authorization(format!(
            "{} requires role {} (has {})",
            claims.username, required, claims.role
        )))
    }
}
