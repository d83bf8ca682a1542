//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `TrackerError`は`external_message()`、`error_type()`、`status_code()`を提供し、
//! APIレスポンスへの変換は`api::error::AppError`が担う。

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Common layer error type
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parse error
    #[error("UUID parse error: {0}")]
    UuidParse(#[from] uuid::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// mrotrack error type
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Conflict error (e.g., duplicate resource, tool already checked out)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Illegal state transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Password hash error
    #[error("Password hash error: {0}")]
    PasswordHash(String),

    /// JWT error
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Authorization error
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Custody chain, export bundle or backup failed verification
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Common(CommonError::Validation(message.into()))
    }

    /// Returns a safe error message for external clients.
    ///
    /// Validation, not-found, conflict and transition errors carry messages
    /// written for the client and are returned as-is. Everything else
    /// collapses to a generic message; the full error goes to the server log.
    pub fn external_message(&self) -> String {
        match self {
            Self::Common(CommonError::Validation(msg)) => msg.clone(),
            Self::Common(_) => "Request error".to_string(),
            Self::NotFound(msg) => format!("Not found: {msg}"),
            Self::Database(_) => "Database error".to_string(),
            Self::Conflict(msg) => msg.clone(),
            Self::InvalidTransition(msg) => msg.clone(),
            Self::PasswordHash(_) => "Authentication error".to_string(),
            Self::Jwt(_) => "Authentication error".to_string(),
            Self::Authentication(_) => "Authentication failed".to_string(),
            Self::Authorization(_) => "Access denied".to_string(),
            Self::Io(_) => "Internal server error".to_string(),
            Self::Integrity(_) => "Integrity check failed".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Returns the error type string used in API responses.
    ///
    /// # Error Types
    ///
    /// - `invalid_request_error`: Bad request parameters
    /// - `authentication_error`: Auth failures
    /// - `permission_error`: Authorization failures
    /// - `not_found_error`: Resource not found
    /// - `conflict_error`: State conflicts and illegal transitions
    /// - `integrity_error`: Custody chain verification failures
    /// - `server_error`: Internal server errors
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Common(_) => "invalid_request_error",
            Self::NotFound(_) => "not_found_error",
            Self::Database(_) => "server_error",
            Self::Conflict(_) => "conflict_error",
            Self::InvalidTransition(_) => "conflict_error",
            Self::PasswordHash(_) => "authentication_error",
            Self::Jwt(_) => "authentication_error",
            Self::Authentication(_) => "authentication_error",
            Self::Authorization(_) => "permission_error",
            Self::Io(_) => "server_error",
            Self::Integrity(_) => "integrity_error",
            Self::Internal(_) => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Common(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Jwt(_) => StatusCode::UNAUTHORIZED,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts this error to the JSON error body.
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                message: self.external_message(),
                error_type: self.error_type().to_string(),
                code: Some(self.status_code().as_u16().to_string()),
            },
        }
    }

    /// sqlxエラーを文脈付きで変換する
    ///
    /// UNIQUE制約違反と外部キー違反は`Conflict`として扱う。
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                return Self::Conflict(format!("{context}: already exists"));
            }
            if message.contains("FOREIGN KEY constraint failed") {
                return Self::Conflict(format!("{context}: referenced by other records"));
            }
        }
        Self::Database(format!("{context}: {err}"))
    }
}

/// エラーレスポンス
///
/// # Example
///
/// ```json
/// {
///   "error": {
///     "message": "Tool 12 is already checked out",
///     "type": "conflict_error",
///     "code": "409"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// The error details
    pub error: ErrorDetail,
}

/// エラー詳細
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    /// Human-readable error message
    pub message: String,
    /// Error type (e.g., "invalid_request_error", "server_error")
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error code (typically HTTP status as string)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// mrotrack Result type alias
pub type TrackerResult<T> = Result<T, TrackerError>;
