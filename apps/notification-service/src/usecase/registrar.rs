//! # クライアント登録ユースケース
//!
//! 呼び出し元クライアントの表示名と、クライアントが送る通知種別を登録する。
//! 既存の登録は表示名・説明文・重要フラグだけを上書きし、テンプレートの割り当ては保持する。

use std::{collections::BTreeMap, sync::Arc};

use notifyd_domain::client::{Client, ClientId, Kind, KindId};
use notifyd_infra::{
    TransactionManager,
    repository::{ClientRepository, KindRepository},
};
use notifyd_shared::{event_log::event, log_business_event};

use crate::error::NotifyError;

/// 通知種別 1 件分の登録内容
#[derive(Debug, Clone, Default)]
pub struct KindRegistration {
    pub description: String,
    pub critical:    bool,
}

/// 登録内容
#[derive(Debug, Clone, Default)]
pub struct RegistrationInput {
    pub source_name:   String,
    /// 種別 ID → 登録内容
    pub notifications: BTreeMap<String, KindRegistration>,
}

/// 登録結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub client: Client,
    pub kinds:  Vec<Kind>,
}

/// クライアント登録ユースケース
pub struct RegistrarUseCase {
    tx_manager: Arc<dyn TransactionManager>,
    clients:    Arc<dyn ClientRepository>,
    kinds:      Arc<dyn KindRepository>,
}

impl RegistrarUseCase {
    pub fn new(
        tx_manager: Arc<dyn TransactionManager>,
        clients: Arc<dyn ClientRepository>,
        kinds: Arc<dyn KindRepository>,
    ) -> Self {
        Self {
            tx_manager,
            clients,
            kinds,
        }
    }

    /// クライアントと通知種別を 1 トランザクションで登録する
    ///
    /// 入力をすべて検証してから書き込むため、一部の種別だけが登録されることはない。
    #[tracing::instrument(skip_all, fields(client_id = %client_id))]
    pub async fn register(
        &self,
        client_id: &ClientId,
        input: RegistrationInput,
    ) -> Result<Registration, NotifyError> {
        let source_name = input.source_name.trim().to_string();
        if source_name.is_empty() {
            return Err(NotifyError::Validation(
                "source_name は必須です".to_string(),
            ));
        }

        let kinds = input
            .notifications
            .into_iter()
            .map(|(id, registration)| {
                let id = KindId::new(id)?;
                let description = registration.description.trim().to_string();
                if description.is_empty() {
                    return Err(NotifyError::Validation(format!(
                        "通知種別 {id} の description は必須です"
                    )));
                }
                Ok(Kind {
                    id,
                    client_id: client_id.clone(),
                    description,
                    critical: registration.critical,
                    template_id: None,
                })
            })
            .collect::<Result<Vec<_>, NotifyError>>()?;

        let client = Client {
            id: client_id.clone(),
            source_name,
            template_id: None,
        };

        let mut tx = self.tx_manager.begin().await?;
        self.clients.register(&mut tx, &client).await?;
        for kind in &kinds {
            self.kinds.register(&mut tx, kind).await?;
        }
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::REGISTRATION,
            event.action = event::action::CLIENT_REGISTERED,
            event.entity_type = event::entity_type::CLIENT,
            event.entity_id = %client.id,
            event.client_id = %client.id,
            event.result = event::result::SUCCESS,
            kinds = kinds.len(),
            "クライアントを登録"
        );

        Ok(Registration { client, kinds })
    }
}
