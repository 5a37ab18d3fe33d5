//! # 登録ハンドラ
//!
//! ## エンドポイント
//!
//! - `PUT /notifications` - 呼び出し元クライアントと通知種別を登録する
//!
//! ## リクエスト例
//!
//! ```json
//! {
//!   "source_name": "Deploy Service",
//!   "notifications": {
//!     "deploy.finished": { "description": "Deploy finished", "critical": false }
//!   }
//! }
//! ```

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use notifyd_shared::ApiResponse;
use serde::{Deserialize, Serialize};

use super::notify::extract_client_id;
use crate::{
    error::NotifyError,
    usecase::{KindRegistration, RegistrarUseCase, Registration, RegistrationInput},
};

/// 登録 API の共有状態
pub struct RegistrationState {
    pub usecase: RegistrarUseCase,
}

/// 登録リクエスト
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub source_name:   String,
    #[serde(default)]
    pub notifications: BTreeMap<String, KindRequest>,
}

/// 通知種別 1 件分の登録内容
#[derive(Debug, Deserialize)]
pub struct KindRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub critical:    bool,
}

/// 登録結果 DTO
#[derive(Debug, Serialize)]
pub struct RegistrationData {
    pub client_id:     String,
    pub source_name:   String,
    pub notifications: Vec<KindData>,
}

/// 通知種別 DTO
#[derive(Debug, Serialize)]
pub struct KindData {
    pub id:          String,
    pub description: String,
    pub critical:    bool,
}

impl From<Registration> for RegistrationData {
    fn from(registration: Registration) -> Self {
        Self {
            client_id:     registration.client.id.into_string(),
            source_name:   registration.client.source_name,
            notifications: registration
                .kinds
                .into_iter()
                .map(|kind| KindData {
                    id:          kind.id.as_str().to_string(),
                    description: kind.description,
                    critical:    kind.critical,
                })
                .collect(),
        }
    }
}

/// PUT /notifications
#[tracing::instrument(skip_all)]
pub async fn register_notifications(
    State(state): State<Arc<RegistrationState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, NotifyError> {
    let client_id = extract_client_id(&headers)?;

    let input = RegistrationInput {
        source_name:   req.source_name,
        notifications: req
            .notifications
            .into_iter()
            .map(|(id, kind)| {
                (
                    id,
                    KindRegistration {
                        description: kind.description,
                        critical:    kind.critical,
                    },
                )
            })
            .collect(),
    };
    let registration = state.usecase.register(&client_id, input).await?;

    let response = ApiResponse::new(RegistrationData::from(registration));
    Ok((StatusCode::OK, Json(response)).into_response())
}
