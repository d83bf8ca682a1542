//! axumサーバー起動・シャットダウンハンドリング

use crate::custody::{ChainVerificationResult, CustodyLog};
use crate::shutdown::ShutdownController;
use crate::AppState;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// axumサーバーを起動し、シャットダウンシグナルを待機する
pub async fn run(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();

    let app = crate::api::create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    info!("mrotrack server listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// チェーンを検証して結果をログに残す
pub async fn verify_and_log(custody: &CustodyLog) -> Option<ChainVerificationResult> {
    match custody.verify().await {
        Ok(result) => {
            if result.valid {
                info!(
                    entries = result.entries_checked,
                    head = ?result.head_hash,
                    "Custody chain verified"
                );
            } else {
                error!(
                    entries = result.entries_checked,
                    first_invalid_seq = ?result.first_invalid_seq,
                    message = ?result.message,
                    "Custody chain verification FAILED"
                );
            }
            Some(result)
        }
        Err(e) => {
            warn!("Custody chain verification could not run: {}", e);
            None
        }
    }
}

/// 定期的にチェーンを検証するバックグラウンドタスクを開始する
///
/// 最初の検証は`interval`経過後。シャットダウン要求で終了する。
pub fn spawn_chain_verifier(
    custody: CustodyLog,
    interval: Duration,
    shutdown: ShutdownController,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // intervalの最初のtickは即時なので読み捨てる
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    verify_and_log(&custody).await;
                }
                _ = shutdown.wait() => {
                    info!("Custody chain verifier stopped");
                    break;
                }
            }
        }
    })
}

/// シャットダウンシグナルを待機
async fn shutdown_signal(shutdown: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = shutdown.wait() => {
            info!("Shutdown requested, shutting down...");
        }
    }
    // バックグラウンドタスクにも伝える
    shutdown.request_shutdown();
}
