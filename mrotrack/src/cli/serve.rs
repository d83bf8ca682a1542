//! serve サブコマンド
//!
//! HTTPサーバーを起動します。

use crate::auth::bootstrap::ensure_admin_exists;
use crate::auth::secret::load_or_create_jwt_secret;
use crate::config::{CustodyConfig, ServerConfig, StorageConfig};
use crate::db::migrations::initialize_database;
use crate::{server, AppState};
use clap::Args;
use tracing::{error, info};

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long, default_value = "8080", env = "MROTRACK_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "MROTRACK_HOST")]
    pub host: String,
}

impl Default for ServeArgs {
    fn default() -> Self {
        let config = ServerConfig::from_env();
        Self {
            port: config.port,
            host: config.host,
        }
    }
}

impl ServeArgs {
    /// サーバー設定に変換
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Execute the serve command
pub async fn execute(args: &ServeArgs, storage: StorageConfig) -> anyhow::Result<()> {
    let server_config = args.server_config();
    let custody_config = CustodyConfig::from_env();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database_url = %storage.database_url,
        "Starting mrotrack"
    );

    let db_pool = initialize_database(&storage.database_url).await?;
    let jwt_secret = load_or_create_jwt_secret(&storage.data_dir)?;
    let state = AppState::new(db_pool, jwt_secret, storage);

    ensure_admin_exists(&state.custody).await?;

    // 起動時のチェーン検証。不整合でも起動は続け、エラーとして記録する
    if let Some(result) = server::verify_and_log(&state.custody).await {
        if !result.valid {
            error!("Custody chain is broken; run `mrotrack custody verify` for details");
        }
    }

    let verifier = if custody_config.periodic_verify_enabled() {
        Some(server::spawn_chain_verifier(
            state.custody.clone(),
            custody_config.verify_interval,
            state.shutdown.clone(),
        ))
    } else {
        info!("Periodic custody verification disabled");
        None
    };

    let pool = state.db_pool.clone();
    let shutdown = state.shutdown.clone();
    let result = server::run(state, &server_config.bind_addr()).await;

    shutdown.request_shutdown();
    if let Some(handle) = verifier {
        let _ = handle.await;
    }
    pool.close().await;

    result
}
