//! # Notification Service エラー定義
//!
//! 通知リクエストの同期処理で発生するエラーと、HTTP レスポンスへの変換を定義する。
//!
//! ## エラーと HTTP ステータスの対応
//!
//! | エラー | HTTP ステータス | `type` |
//! |-------|----------------|--------|
//! | `Validation` | 422 | `validation-error` |
//! | `Unauthorized` | 401 | `unauthorized` |
//! | `NotFound` | 404 | `not-found` |
//! | `DirectoryUnavailable` | 502 | `directory-unavailable` |
//! | `DirectoryUnknown` | 502 | `directory-error` |
//! | `TemplateLoad` | 500 | `template-load-failure` |
//! | `Persistence` / `Internal` | 500 | `internal-error` |
//!
//! 送信経路のエラーはワーカー側で処理され、ここには現れない。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use notifyd_domain::DomainError;
use notifyd_infra::{InfraError, directory::DirectoryError, template_store::TemplateLoadError};
use notifyd_shared::{ErrorResponse, event_log::error as log_error};
use thiserror::Error;

/// Notification Service で発生するエラー
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 入力値の検証失敗
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// 呼び出し元クライアントを特定できない
    #[error("認証されていません: {0}")]
    Unauthorized(String),

    /// スペース・組織・メッセージが存在しない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// ディレクトリサービスに到達できない
    #[error("ディレクトリサービスに到達できません: {0}")]
    DirectoryUnavailable(String),

    /// ディレクトリサービスが想定外の応答を返した
    #[error("ディレクトリサービスでエラーが発生しました: {0}")]
    DirectoryUnknown(String),

    /// テンプレートを読み込めない
    #[error("テンプレートを読み込めません: {0}")]
    TemplateLoad(#[from] TemplateLoadError),

    /// 永続化の失敗
    #[error("データベースエラー: {0}")]
    Persistence(#[from] InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<DomainError> for NotifyError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::NotFound { .. } => Self::NotFound(e.to_string()),
        }
    }
}

impl From<DirectoryError> for NotifyError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::Unavailable(_) => Self::DirectoryUnavailable(e.to_string()),
            DirectoryError::NotFound { .. } => Self::NotFound(e.to_string()),
            DirectoryError::Unknown(_) => Self::DirectoryUnknown(e.to_string()),
        }
    }
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let body = match &self {
            NotifyError::Validation(msg) => ErrorResponse::validation_error(msg),
            NotifyError::Unauthorized(msg) => ErrorResponse::unauthorized(msg),
            NotifyError::NotFound(msg) => ErrorResponse::not_found(msg),
            NotifyError::DirectoryUnavailable(msg) => {
                tracing::warn!(
                    error.category = log_error::category::EXTERNAL_SERVICE,
                    error.kind = log_error::kind::DIRECTORY,
                    "ディレクトリサービスに到達できません: {}",
                    msg
                );
                ErrorResponse::directory_unavailable(msg)
            }
            NotifyError::DirectoryUnknown(msg) => {
                tracing::error!(
                    error.category = log_error::category::EXTERNAL_SERVICE,
                    error.kind = log_error::kind::DIRECTORY,
                    "ディレクトリサービスエラー: {}",
                    msg
                );
                ErrorResponse::directory_error(msg)
            }
            NotifyError::TemplateLoad(e) => {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::TEMPLATE,
                    "テンプレート読み込みエラー: {}",
                    e
                );
                ErrorResponse::template_load_failure(format!("テンプレート {} を読み込めません", e.name))
            }
            NotifyError::Persistence(e) => {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::DATABASE,
                    span_trace = %e.span_trace(),
                    "データベースエラー: {}",
                    e
                );
                ErrorResponse::internal_error()
            }
            NotifyError::Internal(msg) => {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::INTERNAL,
                    "内部エラー: {}",
                    msg
                );
                ErrorResponse::internal_error()
            }
        };

        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
