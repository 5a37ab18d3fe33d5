//! # 通知ハンドラ
//!
//! 宛先指定ごとの通知エンドポイントを提供する。
//!
//! ## エンドポイント
//!
//! - `POST /users/{user_guid}` - 1 ユーザー
//! - `POST /spaces/{space_guid}` - スペースのメンバー全員
//! - `POST /organizations/{org_guid}` - 組織のメンバー（`role` で絞り込み可）
//! - `POST /everyone` - 全ユーザー
//! - `POST /uaa_scopes/{scope}` - スコープを持つユーザー
//! - `POST /emails` - メールアドレス直接指定（`to`）
//!
//! 呼び出し元クライアントは上流の認証レイヤーが付与する `X-Client-Id` ヘッダーで識別する。
//! レスポンスは `{status, recipient, notification_id}` のリスト（エンベロープなし）。

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use notifyd_domain::client::ClientId;
use serde::Deserialize;

use crate::{
    error::NotifyError,
    usecase::{AddressingTarget, NotifyInput, NotifyUseCase},
};

/// 呼び出し元クライアントを示すヘッダー
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// 通知 API の共有状態
pub struct NotifyState {
    pub usecase: NotifyUseCase,
}

/// 通知リクエスト
#[derive(Debug, Default, Deserialize)]
pub struct NotifyRequest {
    pub kind_id:  Option<String>,
    pub subject:  Option<String>,
    pub text:     Option<String>,
    pub html:     Option<String>,
    pub reply_to: Option<String>,
    /// `/emails` の宛先
    pub to:       Option<String>,
    /// `/organizations/{org_guid}` の絞り込みロール
    pub role:     Option<String>,
}

impl NotifyRequest {
    fn into_input(self) -> NotifyInput {
        NotifyInput {
            kind_id:  self.kind_id,
            subject:  self.subject,
            text:     self.text,
            html:     self.html,
            reply_to: self.reply_to,
        }
    }
}

/// X-Client-Id ヘッダーから呼び出し元クライアントを取り出す
pub fn extract_client_id(headers: &HeaderMap) -> Result<ClientId, NotifyError> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| ClientId::new(v).ok())
        .ok_or_else(|| NotifyError::Unauthorized(format!("{CLIENT_ID_HEADER} ヘッダーが必要です")))
}

async fn dispatch(
    state: &NotifyState,
    client_id: ClientId,
    target: AddressingTarget,
    req: NotifyRequest,
) -> Result<Response, NotifyError> {
    let responses = state
        .usecase
        .dispatch(&client_id, &target, req.into_input())
        .await?;
    Ok((StatusCode::OK, Json(responses)).into_response())
}

/// POST /users/{user_guid}
#[tracing::instrument(skip_all, fields(%user_guid))]
pub async fn notify_user(
    State(state): State<Arc<NotifyState>>,
    Path(user_guid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Result<Response, NotifyError> {
    let client_id = extract_client_id(&headers)?;
    let target = AddressingTarget::user(&user_guid)?;
    dispatch(&state, client_id, target, req).await
}

/// POST /spaces/{space_guid}
#[tracing::instrument(skip_all, fields(%space_guid))]
pub async fn notify_space(
    State(state): State<Arc<NotifyState>>,
    Path(space_guid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Result<Response, NotifyError> {
    let client_id = extract_client_id(&headers)?;
    let target = AddressingTarget::space(&space_guid)?;
    dispatch(&state, client_id, target, req).await
}

/// POST /organizations/{org_guid}
#[tracing::instrument(skip_all, fields(%org_guid))]
pub async fn notify_organization(
    State(state): State<Arc<NotifyState>>,
    Path(org_guid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Result<Response, NotifyError> {
    let client_id = extract_client_id(&headers)?;
    let target = AddressingTarget::organization(&org_guid, req.role.as_deref())?;
    dispatch(&state, client_id, target, req).await
}

/// POST /everyone
#[tracing::instrument(skip_all)]
pub async fn notify_everyone(
    State(state): State<Arc<NotifyState>>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Result<Response, NotifyError> {
    let client_id = extract_client_id(&headers)?;
    dispatch(&state, client_id, AddressingTarget::everyone(), req).await
}

/// POST /uaa_scopes/{scope}
#[tracing::instrument(skip_all, fields(%scope))]
pub async fn notify_uaa_scope(
    State(state): State<Arc<NotifyState>>,
    Path(scope): Path<String>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Result<Response, NotifyError> {
    let client_id = extract_client_id(&headers)?;
    let target = AddressingTarget::uaa_scope(&scope)?;
    dispatch(&state, client_id, target, req).await
}

/// POST /emails
#[tracing::instrument(skip_all)]
pub async fn notify_email(
    State(state): State<Arc<NotifyState>>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Result<Response, NotifyError> {
    let client_id = extract_client_id(&headers)?;
    let target = AddressingTarget::email(req.to.as_deref().unwrap_or_default())?;
    dispatch(&state, client_id, target, req).await
}
