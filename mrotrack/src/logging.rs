//! ログ初期化
//!
//! 標準出力には人間向けの書式、`MROTRACK_LOG_DIR`には日次ローテーションの
//! JSONを書き出す。

use crate::config::get_env_with_fallback;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログファイル名の接頭辞
pub const LOG_FILE_PREFIX: &str = "mrotrack.jsonl";

// ノンブロッキングライターはガードが生きている間だけ書き込む
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// ログレベルのフィルタ文字列
///
/// `MROTRACK_LOG_LEVEL`、なければ`RUST_LOG`、どちらも無ければ`info`。
pub fn log_filter() -> String {
    get_env_with_fallback("MROTRACK_LOG_LEVEL", "RUST_LOG").unwrap_or_else(|| "info".to_string())
}

/// ログディレクトリ
pub fn log_dir(data_dir: &Path) -> PathBuf {
    std::env::var("MROTRACK_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("logs"))
}

/// ロガーを初期化する
///
/// `log_dir`が`None`ならファイル出力なし（CLIの単発コマンド用）。
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_current_span(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init()?;
            let _ = FILE_GUARD.set(guard);
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer.with_writer(std::io::stderr))
                .try_init()?;
        }
    }
    Ok(())
}
