//! REST APIハンドラー
//!
//! `/health`と`/api/auth/login`以外はJWT認証が必要。

/// ログイン・パスワード変更
pub mod auth;
/// 貸出・返却
pub mod checkouts;
/// 化学品
pub mod chemicals;
/// カストディログ
pub mod custody;
/// エラーレスポンス
pub mod error;
/// キット
pub mod kits;
/// 調達依頼
pub mod orders;
/// ヘルスチェック・バージョン
pub mod system;
/// 工具
pub mod tools;
/// ユーザー管理
pub mod users;

use crate::auth::middleware::jwt_auth_middleware;
use crate::AppState;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// APIルーターを作成
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/password", put(auth::change_password))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/:id",
            put(users::update_user).delete(users::delete_user),
        )
        .route("/api/tools", get(tools::list_tools).post(tools::create_tool))
        .route(
            "/api/tools/:id",
            get(tools::get_tool)
                .put(tools::update_tool)
                .delete(tools::retire_tool),
        )
        .route("/api/tools/:id/status", put(tools::set_tool_status))
        .route(
            "/api/checkouts",
            get(checkouts::list_checkouts).post(checkouts::create_checkout),
        )
        .route("/api/checkouts/:id", get(checkouts::get_checkout))
        .route("/api/checkouts/:id/return", post(checkouts::return_checkout))
        .route(
            "/api/chemicals",
            get(chemicals::list_chemicals).post(chemicals::create_chemical),
        )
        .route(
            "/api/chemicals/:id",
            get(chemicals::get_chemical).put(chemicals::update_chemical),
        )
        .route("/api/chemicals/:id/issue", post(chemicals::issue_chemical))
        .route(
            "/api/chemicals/:id/issuances",
            get(chemicals::list_issuances),
        )
        .route("/api/kits", get(kits::list_kits).post(kits::create_kit))
        .route("/api/kits/:id", get(kits::get_kit))
        .route("/api/kits/:id/items", post(kits::add_kit_item))
        .route(
            "/api/kits/:id/items/:item_id",
            delete(kits::remove_kit_item),
        )
        .route("/api/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/orders/:id/status", put(orders::set_order_status))
        .route("/api/custody/entries", get(custody::list_entries))
        .route("/api/custody/verify", post(custody::verify))
        .route("/api/custody/export.csv", get(custody::export_csv))
        .route("/api/custody/backup", post(custody::backup))
        .route("/api/system/version", get(system::version))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    Router::new()
        .route("/health", get(system::health))
        .route("/api/auth/login", post(auth::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
