//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs.

use std::path::PathBuf;
use std::time::Duration;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use mrotrack::config::get_env_with_fallback;
///
/// let url = get_env_with_fallback("MROTRACK_DATABASE_URL", "DATABASE_URL");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Falls back to `default` if neither is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// データディレクトリ
///
/// `MROTRACK_DATA_DIR`、未設定なら`~/.mrotrack`。
/// HOMEも取れない環境（systemdサービス等）ではカレントディレクトリ配下を使う。
pub fn data_dir() -> PathBuf {
    if let Some(dir) = get_env_with_fallback("MROTRACK_DATA_DIR", "DATA_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        Ok(home) => PathBuf::from(home).join(".mrotrack"),
        Err(_) => PathBuf::from(".mrotrack"),
    }
}

/// HTTPサーバー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// バインドするホスト
    pub host: String,
    /// ポート
    pub port: u16,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: get_env_with_fallback_or("MROTRACK_HOST", "HOST", "0.0.0.0"),
            port: get_env_with_fallback_parse("MROTRACK_PORT", "PORT", 8080u16),
        }
    }

    /// `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// ストレージ設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// データディレクトリ
    pub data_dir: PathBuf,
    /// データベースURL
    pub database_url: String,
    /// バックアップ出力先
    pub backup_dir: PathBuf,
}

impl StorageConfig {
    /// Load storage configuration from environment variables.
    pub fn from_env() -> Self {
        let data_dir = data_dir();
        let database_url = get_env_with_fallback("MROTRACK_DATABASE_URL", "DATABASE_URL")
            .unwrap_or_else(|| default_database_url(&data_dir));
        let backup_dir = get_env_with_fallback("MROTRACK_BACKUP_DIR", "BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("backups"));
        Self {
            data_dir,
            database_url,
            backup_dir,
        }
    }

    /// データベースURLをファイルパスに変換する（メモリDBならNone）
    pub fn database_path(&self) -> Option<PathBuf> {
        database_path_from_url(&self.database_url)
    }
}

/// データディレクトリ配下の既定データベースURL
pub fn default_database_url(data_dir: &std::path::Path) -> String {
    format!("sqlite:{}", data_dir.join("mrotrack.db").display())
}

/// `sqlite:`URLからファイルパスを取り出す
pub fn database_path_from_url(url: &str) -> Option<PathBuf> {
    if url.contains(":memory:") || url.contains("mode=memory") {
        return None;
    }
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// カストディログ設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustodyConfig {
    /// 定期チェーン検証の間隔
    pub verify_interval: Duration,
}

impl CustodyConfig {
    /// Load custody configuration from environment variables.
    ///
    /// `MROTRACK_CUSTODY_VERIFY_INTERVAL_SECS`（既定24時間、0で無効）。
    pub fn from_env() -> Self {
        let secs = get_env_with_fallback_parse(
            "MROTRACK_CUSTODY_VERIFY_INTERVAL_SECS",
            "CUSTODY_VERIFY_INTERVAL_SECS",
            24 * 60 * 60u64,
        );
        Self {
            verify_interval: Duration::from_secs(secs),
        }
    }

    /// 定期検証が有効か
    pub fn periodic_verify_enabled(&self) -> bool {
        !self.verify_interval.is_zero()
    }
}
