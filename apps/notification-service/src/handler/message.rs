//! # 配信結果ハンドラ
//!
//! ## エンドポイント
//!
//! - `GET /messages/{message_id}` - 1 件の配信結果（保持期間を過ぎたものは 404）

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use notifyd_domain::{message::Message, notification::MessageId};
use notifyd_infra::repository::MessageRepository;
use notifyd_shared::ApiResponse;
use serde::Serialize;
use uuid::Uuid;

use crate::error::NotifyError;

/// 配信結果 API の共有状態
pub struct MessageState {
    pub messages: Arc<dyn MessageRepository>,
}

/// 配信結果 DTO
#[derive(Debug, Serialize)]
pub struct MessageData {
    pub id:         String,
    pub status:     String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Message> for MessageData {
    fn from(message: Message) -> Self {
        Self {
            id:         message.id.to_string(),
            status:     message.status.to_string(),
            created_at: message.created_at.to_rfc3339(),
            updated_at: message.updated_at.to_rfc3339(),
        }
    }
}

/// GET /messages/{message_id}
#[tracing::instrument(skip_all, fields(%message_id))]
pub async fn get_message(
    State(state): State<Arc<MessageState>>,
    Path(message_id): Path<String>,
) -> Result<Response, NotifyError> {
    let id = Uuid::parse_str(&message_id)
        .map(MessageId::from_uuid)
        .map_err(|_| NotifyError::Validation(format!("メッセージ ID の形式が不正です: {message_id}")))?;

    let message = state
        .messages
        .find_by_id(&id)
        .await?
        .ok_or_else(|| NotifyError::NotFound(format!("メッセージ {message_id} が見つかりません")))?;

    let response = ApiResponse::new(MessageData::from(message));
    Ok((StatusCode::OK, Json(response)).into_response())
}
