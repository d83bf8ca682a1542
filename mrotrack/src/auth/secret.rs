//! JWTシークレットの管理
//!
//! `MROTRACK_JWT_SECRET`が無ければ`<data_dir>/jwt_secret`を使い、
//! ファイルも無ければ生成して保存する。

use crate::common::error::{TrackerError, TrackerResult};
use crate::config::get_env_with_fallback;
use std::path::Path;

/// シークレットファイル名
pub const JWT_SECRET_FILE: &str = "jwt_secret";

/// 生成するシークレットの長さ
const GENERATED_SECRET_LENGTH: usize = 64;

/// JWTシークレットを読み込む（必要なら生成）
pub fn load_or_create_jwt_secret(data_dir: &Path) -> TrackerResult<String> {
    if let Some(secret) = get_env_with_fallback("MROTRACK_JWT_SECRET", "SECRET_KEY") {
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    let path = data_dir.join(JWT_SECRET_FILE);
    if path.exists() {
        let secret = std::fs::read_to_string(&path)?.trim().to_string();
        if !secret.is_empty() {
            tracing::debug!(path = %path.display(), "Loaded JWT secret from file");
            return Ok(secret);
        }
        tracing::warn!(path = %path.display(), "JWT secret file is empty, regenerating");
    }

    let secret = crate::auth::generate_random_token(GENERATED_SECRET_LENGTH);
    write_secret_file(&path, &secret)?;
    tracing::info!(path = %path.display(), "Generated new JWT secret");
    Ok(secret)
}

fn write_secret_file(path: &Path, secret: &str) -> TrackerResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
            TrackerError::Internal(format!(
                "Failed to restrict permissions on {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("MROTRACK_JWT_SECRET");
        std::env::remove_var("SECRET_KEY");
    }

    #[test]
    #[serial]
    fn env_secret_wins() {
        clear_env();
        std::env::set_var("MROTRACK_JWT_SECRET", "from-env");
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_or_create_jwt_secret(dir.path()).unwrap(), "from-env");
        assert!(!dir.path().join(JWT_SECRET_FILE).exists());
        clear_env();
    }

    #[test]
    #[serial]
    fn generated_secret_is_persisted() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_jwt_secret(dir.path()).unwrap();
        assert_eq!(first.len(), 64);
        let second = load_or_create_jwt_secret(dir.path()).unwrap();
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join(JWT_SECRET_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
