//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::common::error::TrackerError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub TrackerError);

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        AppError(err)
    }
}

impl From<crate::common::error::CommonError> for AppError {
    fn from(err: crate::common::error::CommonError) -> Self {
        AppError(TrackerError::Common(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // クライアントにはexternal_message()のみ返し、詳細はログに残す
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (status, Json(self.0.to_error_response())).into_response()
    }
}
