//! # 通知ユースケース
//!
//! 6 種類の宛先指定に共通する通知の受付処理。
//!
//! ## 処理の流れ
//!
//! 1. 入力を検証する（種別 ID、本文）
//! 2. ディレクトリのアクセストークンを 1 回だけ取得する（メールアドレス宛ては取得しない）
//! 3. 宛先を解決する
//! 4. トランザクションを開始し、クライアントと種別を登録する
//! 5. テンプレートを決定する
//! 6. 宛先ごとにエンキューしてコミットする
//!
//! ## 設計方針
//!
//! - **ディレクトリ解決はトランザクションの外**: 解決に失敗した場合は何もエンキューせずに
//!   エラーを返す。DB 接続をディレクトリ通信の間保持しない
//! - **全宛先を 1 トランザクションで**: 途中で失敗すればロールバックされ、一部だけが
//!   キューに入ることはない

use std::sync::Arc;

use notifyd_domain::{
    client::{ClientId, KindId, TemplateId},
    notification::{Options, Response},
};
use notifyd_infra::{
    TransactionManager,
    TxContext,
    directory::UserDirectory,
    repository::{ClientRepository, KindRepository},
};

use super::{
    mailer::{Envelope, Mailer},
    strategy::{AddressingTarget, Audience, RecipientResolver},
    template_loader::TemplateLoader,
};
use crate::error::NotifyError;

/// 呼び出し元が指定する通知内容
#[derive(Debug, Clone, Default)]
pub struct NotifyInput {
    pub kind_id:  Option<String>,
    pub subject:  Option<String>,
    pub text:     Option<String>,
    pub html:     Option<String>,
    pub reply_to: Option<String>,
}

/// 通知ユースケース
pub struct NotifyUseCase {
    tx_manager: Arc<dyn TransactionManager>,
    users:      Arc<dyn UserDirectory>,
    resolver:   RecipientResolver,
    clients:    Arc<dyn ClientRepository>,
    kinds:      Arc<dyn KindRepository>,
    loader:     TemplateLoader,
    mailer:     Mailer,
}

impl NotifyUseCase {
    pub fn new(
        tx_manager: Arc<dyn TransactionManager>,
        users: Arc<dyn UserDirectory>,
        resolver: RecipientResolver,
        clients: Arc<dyn ClientRepository>,
        kinds: Arc<dyn KindRepository>,
        loader: TemplateLoader,
        mailer: Mailer,
    ) -> Self {
        Self {
            tx_manager,
            users,
            resolver,
            clients,
            kinds,
            loader,
            mailer,
        }
    }

    /// 通知を受け付け、宛先ごとの受付結果を返す
    #[tracing::instrument(
        skip_all,
        fields(client_id = %client_id, target = target.label())
    )]
    pub async fn dispatch(
        &self,
        client_id: &ClientId,
        target: &AddressingTarget,
        input: NotifyInput,
    ) -> Result<Vec<Response>, NotifyError> {
        let kind_id = validate(target, &input)?;

        let audience = match Audience::direct(target) {
            Some(audience) => audience,
            None => {
                let token = self.users.client_token().await?;
                self.resolver.resolve(target, &token).await?
            }
        };

        let mut tx = self.tx_manager.begin().await?;
        let (options, assigned) = self
            .register(&mut tx, client_id, kind_id, input)
            .await?;

        let templates = self
            .loader
            .load(
                assigned.as_ref(),
                options.subject_provided(),
                target.body_kind(),
            )
            .await?;

        let envelope = Envelope {
            client_id: client_id.clone(),
            options,
            templates,
            space: audience.space,
            organization: audience.organization,
        };
        let responses = self
            .mailer
            .deliver(&mut tx, &envelope, audience.recipients)
            .await?;

        tx.commit().await?;

        tracing::info!(
            responses = responses.len(),
            "通知を受け付けました"
        );
        Ok(responses)
    }

    /// クライアントと種別を登録し、テンプレートに渡す説明文と割り当てテンプレートを決める
    ///
    /// 説明文が未登録の場合は ID で代用する。
    async fn register(
        &self,
        tx: &mut TxContext,
        client_id: &ClientId,
        kind_id: Option<KindId>,
        input: NotifyInput,
    ) -> Result<(Options, Option<TemplateId>), NotifyError> {
        self.clients.ensure(tx, client_id).await?;
        let client = self.clients.find_by_id(tx, client_id).await?;

        let source_description = client
            .as_ref()
            .map(|c| c.source_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| client_id.to_string());

        let kind = match &kind_id {
            Some(kind_id) => {
                self.kinds.ensure(tx, kind_id, client_id).await?;
                self.kinds.find(tx, kind_id, client_id).await?
            }
            None => None,
        };

        let kind_description = match &kind_id {
            Some(kind_id) => kind
                .as_ref()
                .map(|k| k.description.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| kind_id.as_str().to_string()),
            None => String::new(),
        };
        let assigned = match (&kind, &client) {
            (Some(kind), Some(client)) => kind.template_to_use(client).cloned(),
            (Some(kind), None) => kind.template_id.clone(),
            (None, client) => client.as_ref().and_then(|c| c.template_id.clone()),
        };

        let options = Options {
            kind_id,
            kind_description,
            source_description,
            subject: input.subject.filter(|s| !s.trim().is_empty()),
            text: input.text.unwrap_or_default(),
            html: input.html.unwrap_or_default(),
            reply_to: input.reply_to.filter(|r| !r.trim().is_empty()),
        };
        Ok((options, assigned))
    }
}

/// 入力を検証し、種別 ID を返す
///
/// 種別 ID はメール宛て以外で必須。本文は `text` か `html` のどちらかが必要。
fn validate(target: &AddressingTarget, input: &NotifyInput) -> Result<Option<KindId>, NotifyError> {
    let kind_id = match input.kind_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Some(KindId::new(id)?),
        _ if target.is_email() => None,
        _ => {
            return Err(NotifyError::Validation(
                "kind_id は必須です".to_string(),
            ));
        }
    };

    let has_text = input.text.as_deref().is_some_and(|t| !t.is_empty());
    let has_html = input.html.as_deref().is_some_and(|h| !h.is_empty());
    if !has_text && !has_html {
        return Err(NotifyError::Validation(
            "text か html のどちらかが必要です".to_string(),
        ));
    }

    Ok(kind_id)
}
