// パスワードハッシュ化と検証（bcrypt実装）

use crate::common::error::TrackerError;
use bcrypt::{hash, verify};

/// パスワードハッシュ化のコスト（12推奨、200-300ms）
const HASH_COST: u32 = 12;

/// パスワードの最小長
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// パスワードをbcryptでハッシュ化
///
/// # Arguments
/// * `password` - ハッシュ化するパスワード
///
/// # Returns
/// * `Ok(String)` - bcryptハッシュ文字列（$2b$で始まる）
/// * `Err(TrackerError)` - ハッシュ化失敗
pub fn hash_password(password: &str) -> Result<String, TrackerError> {
    hash(password, HASH_COST)
        .map_err(|e| TrackerError::PasswordHash(format!("Failed to hash password: {}", e)))
}

/// パスワードを検証
///
/// # Returns
/// * `Ok(true)` - パスワード一致
/// * `Ok(false)` - パスワード不一致
/// * `Err(TrackerError)` - ハッシュ文字列が不正
pub fn verify_password(password: &str, hash: &str) -> Result<bool, TrackerError> {
    verify(password, hash)
        .map_err(|e| TrackerError::PasswordHash(format!("Failed to verify password: {}", e)))
}

/// 新しいパスワードが受け付け可能か確認する
pub fn validate_new_password(password: &str) -> Result<(), TrackerError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(TrackerError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.trim().is_empty() {
        return Err(TrackerError::validation("Password must not be blank"));
    }
    Ok(())
}
