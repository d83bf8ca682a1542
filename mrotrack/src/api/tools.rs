//! 工具API

use super::error::AppError;
use crate::auth::middleware::require_role;
use crate::common::auth::{Claims, UserRole};
use crate::common::error::TrackerError;
use crate::common::types::{Tool, ToolStatus};
use crate::custody::{actions, CustodyEvent};
use crate::db::tools::{NewTool, ToolFilter, ToolUpdate};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

/// 状態変更リクエスト
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// 変更後の状態
    pub status: ToolStatus,
}

/// GET /api/tools - 工具一覧（status / category / search で絞り込み）
pub async fn list_tools(
    State(app_state): State<AppState>,
    Query(filter): Query<ToolFilter>,
) -> Result<Json<Vec<Tool>>, AppError> {
    Ok(Json(
        crate::db::tools::list(&app_state.db_pool, &filter).await?,
    ))
}

/// GET /api/tools/:id
pub async fn get_tool(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Tool>, AppError> {
    let tool = crate::db::tools::find_by_id(&app_state.db_pool, id)
        .await?
        .ok_or_else(|| TrackerError::NotFound(format!("tool {}", id)))?;
    Ok(Json(tool))
}

/// POST /api/tools - 工具登録（Admin）
pub async fn create_tool(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Json(input): Json<NewTool>,
) -> Result<(StatusCode, Json<Tool>), AppError> {
    require_role(&claims, UserRole::Admin)?;
    if input.tool_number.trim().is_empty() {
        return Err(TrackerError::validation("tool_number must not be empty").into());
    }

    let mut tx = app_state.custody.begin().await?;
    let tool = crate::db::tools::create(&mut tx, &input).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::TOOL_CREATE, "tool", tool.id).with_detail(
            json!({
                "tool_number": tool.tool_number,
                "serial_number": tool.serial_number,
                "location": tool.location,
            }),
        ),
    )
    .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(tool)))
}

/// PUT /api/tools/:id - 工具情報の更新（Admin）
pub async fn update_tool(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<ToolUpdate>,
) -> Result<Json<Tool>, AppError> {
    require_role(&claims, UserRole::Admin)?;

    let mut tx = app_state.custody.begin().await?;
    let tool = crate::db::tools::update(&mut tx, id, &changes).await?;
    tx.append(
        CustodyEvent::new(&claims.username, actions::TOOL_UPDATE, "tool", tool.id)
            .with_detail(json!({"changes": changes})),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(tool))
}

/// PUT /api/tools/:id/status - 保守入り・復帰・廃棄（Admin）
///
/// `checked_out`への変更は貸出APIでのみ行う。
pub async fn set_tool_status(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Tool>, AppError> {
    require_role(&claims, UserRole::Admin)?;
    change_status(&app_state, &claims, id, request.status).await.map(Json)
}

/// DELETE /api/tools/:id - 工具の廃棄（Admin）
///
/// 行は削除せず`retired`にする。貸出履歴とカストディログの参照を保つため。
pub async fn retire_tool(
    Extension(claims): Extension<Claims>,
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Tool>, AppError> {
    require_role(&claims, UserRole::Admin)?;
    change_status(&app_state, &claims, id, ToolStatus::Retired).await.map(Json)
}

async fn change_status(
    app_state: &AppState,
    claims: &Claims,
    id: i64,
    next: ToolStatus,
) -> Result<Tool, AppError> {
    let action = if next == ToolStatus::Retired {
        actions::TOOL_RETIRE
    } else {
        actions::TOOL_STATUS
    };

    let mut tx = app_state.custody.begin().await?;
    let (previous, tool) = crate::db::tools::set_status(&mut tx, id, next).await?;
    tx.append(
        CustodyEvent::new(&claims.username, action, "tool", tool.id).with_detail(json!({
            "tool_number": tool.tool_number,
            "from": previous,
            "to": tool.status,
        })),
    )
    .await?;
    tx.commit().await?;

    Ok(tool)
}
