//! # メーラー（配信のエンキュー）
//!
//! 解決済みの宛先ごとに配信レコードを作り、ジョブキューに積む。
//!
//! ## 設計方針
//!
//! - **同期処理はエンキューまで**: 送信経路への通信は行わず、宛先ごとの受付結果を即座に返す
//! - **呼び出し側のトランザクションに乗る**: 配信停止の確認、エンキュー、受信記録は
//!   すべて引数の [`TxContext`] 上で行う。1 件でも失敗すれば呼び出し側がロールバックする
//! - **配信停止はエンキュー時に確定**: 全体の配信停止を先に確認し、次に種別単位の
//!   配信停止を確認する。結果は `subscribed` として配信レコードに焼き込む
//! - **メッセージ ID は 1 宛先 1 回だけ生成**: リトライしても同じ ID を使う

use std::sync::Arc;

use notifyd_domain::{
    client::ClientId,
    directory::UserGuid,
    notification::{Delivery, MessageId, Options, Response, Templates},
};
use notifyd_infra::{
    TxContext,
    queue::JobQueue,
    repository::{ReceiptRepository, UnsubscribeRepository},
};
use notifyd_shared::{event_log::event, log_business_event};

use super::strategy::Recipient;
use crate::error::NotifyError;

/// リクエスト内で全宛先に共通する内容
#[derive(Debug, Clone)]
pub struct Envelope {
    pub client_id:    ClientId,
    pub options:      Options,
    pub templates:    Templates,
    pub space:        Option<String>,
    pub organization: Option<String>,
}

/// メーラー
pub struct Mailer {
    queue:        Arc<dyn JobQueue>,
    unsubscribes: Arc<dyn UnsubscribeRepository>,
    receipts:     Arc<dyn ReceiptRepository>,
}

impl Mailer {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        unsubscribes: Arc<dyn UnsubscribeRepository>,
        receipts: Arc<dyn ReceiptRepository>,
    ) -> Self {
        Self {
            queue,
            unsubscribes,
            receipts,
        }
    }

    /// 宛先ごとに配信レコードをエンキューし、受付結果を返す
    ///
    /// 結果は `recipients` と同じ順序・同じ件数になる。
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(client_id = %envelope.client_id, recipients = recipients.len())
    )]
    pub async fn deliver(
        &self,
        tx: &mut TxContext,
        envelope: &Envelope,
        recipients: Vec<Recipient>,
    ) -> Result<Vec<Response>, NotifyError> {
        let mut responses = Vec::with_capacity(recipients.len());
        let mut notified = Vec::new();

        for recipient in recipients {
            let response = match recipient {
                Recipient::Missing(guid) => Response::not_found(guid.as_str()),
                Recipient::User(identity) => match identity.primary_email() {
                    None => Response::no_address(identity.guid.as_str()),
                    Some(email) => {
                        let subscribed = self.is_subscribed(tx, envelope, &identity.guid).await?;
                        let message_id = self
                            .enqueue(tx, envelope, Some(identity.guid.clone()), email, subscribed)
                            .await?;
                        notified.push(identity.guid.clone());
                        Response::queued(identity.guid.as_str(), &message_id)
                    }
                },
                Recipient::Email(address) => {
                    let message_id = self.enqueue(tx, envelope, None, &address, true).await?;
                    Response::queued(address, &message_id)
                }
            };
            responses.push(response);
        }

        if let Some(kind_id) = &envelope.options.kind_id {
            self.receipts
                .create_receipts(tx, &notified, &envelope.client_id, kind_id)
                .await?;
        }

        Ok(responses)
    }

    /// 配信停止されていないか
    ///
    /// 全体の配信停止を先に確認する。種別が指定されていない通知は種別単位の確認を行わない。
    async fn is_subscribed(
        &self,
        tx: &mut TxContext,
        envelope: &Envelope,
        user_guid: &UserGuid,
    ) -> Result<bool, NotifyError> {
        if self
            .unsubscribes
            .is_globally_unsubscribed(tx, user_guid)
            .await?
        {
            return Ok(false);
        }

        let Some(kind_id) = &envelope.options.kind_id else {
            return Ok(true);
        };
        let unsubscribed = self
            .unsubscribes
            .is_unsubscribed(tx, user_guid, &envelope.client_id, kind_id)
            .await?;
        Ok(!unsubscribed)
    }

    async fn enqueue(
        &self,
        tx: &mut TxContext,
        envelope: &Envelope,
        user_guid: Option<UserGuid>,
        email: &str,
        subscribed: bool,
    ) -> Result<MessageId, NotifyError> {
        let delivery = Delivery {
            message_id: MessageId::new(),
            client_id: envelope.client_id.clone(),
            user_guid,
            email: email.to_string(),
            space: envelope.space.clone(),
            organization: envelope.organization.clone(),
            options: envelope.options.clone(),
            templates: envelope.templates.clone(),
            subscribed,
        };
        let payload = serde_json::to_value(&delivery)
            .map_err(|e| NotifyError::Internal(format!("配信レコードをシリアライズできません: {e}")))?;

        let job_id = self.queue.enqueue(tx, payload).await?;

        log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_QUEUED,
            event.entity_type = event::entity_type::MESSAGE,
            event.entity_id = %delivery.message_id,
            event.client_id = %delivery.client_id,
            event.result = event::result::SUCCESS,
            job_id = %job_id,
            subscribed,
            "通知をキューに追加"
        );

        Ok(delivery.message_id)
    }
}

#[cfg(test)]
mod tests {
    use notifyd_domain::{client::KindId, directory::Identity, notification::ResponseStatus};
    use notifyd_infra::mock::{MockJobQueue, MockReceiptRepository, MockUnsubscribeRepository};
    use pretty_assertions::assert_eq;

    use super::*;

    struct Fixture {
        queue:        MockJobQueue,
        unsubscribes: MockUnsubscribeRepository,
        receipts:     MockReceiptRepository,
        mailer:       Mailer,
    }

    fn setup() -> Fixture {
        let queue = MockJobQueue::new();
        let unsubscribes = MockUnsubscribeRepository::new();
        let receipts = MockReceiptRepository::new();
        let mailer = Mailer::new(
            Arc::new(queue.clone()),
            Arc::new(unsubscribes.clone()),
            Arc::new(receipts.clone()),
        );
        Fixture {
            queue,
            unsubscribes,
            receipts,
            mailer,
        }
    }

    fn guid(value: &str) -> UserGuid {
        UserGuid::new(value).unwrap()
    }

    fn client_id() -> ClientId {
        ClientId::new("billing").unwrap()
    }

    fn kind_id() -> KindId {
        KindId::new("invoice.ready").unwrap()
    }

    fn envelope(kind_id: Option<KindId>) -> Envelope {
        Envelope {
            client_id:    client_id(),
            options:      Options {
                kind_id,
                kind_description: "Invoice ready".to_string(),
                source_description: "Billing".to_string(),
                subject: None,
                text: "your invoice".to_string(),
                html: String::new(),
                reply_to: None,
            },
            templates:    Templates {
                subject: "{{ kind_description }}".to_string(),
                text:    "{{ text }}".to_string(),
                html:    "{{ html | safe }}".to_string(),
            },
            space:        None,
            organization: None,
        }
    }

    fn user(value: &str, emails: &[&str]) -> Recipient {
        Recipient::User(Identity {
            guid:   guid(value),
            emails: emails.iter().map(ToString::to_string).collect(),
        })
    }

    fn deliveries(queue: &MockJobQueue) -> Vec<Delivery> {
        queue.jobs().iter().map(|job| job.delivery().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_宛先ごとに受付結果を返す() {
        let f = setup();
        let recipients = vec![
            user("user-1", &["one@example.com"]),
            user("user-2", &[]),
            Recipient::Missing(guid("ghost")),
        ];

        let responses = f
            .mailer
            .deliver(&mut TxContext::mock(), &envelope(Some(kind_id())), recipients)
            .await
            .unwrap();

        let statuses: Vec<_> = responses.iter().map(|r| (r.status, r.recipient.as_str())).collect();
        assert_eq!(
            statuses,
            vec![
                (ResponseStatus::Queued, "user-1"),
                (ResponseStatus::NoAddress, "user-2"),
                (ResponseStatus::NotFound, "ghost"),
            ]
        );
        assert!(!responses[0].notification_id.is_empty());
        assert_eq!(responses[1].notification_id, "");
        assert_eq!(f.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_メッセージidは宛先ごとに異なりジョブのペイロードと一致する() {
        let f = setup();
        let recipients = vec![
            user("user-1", &["one@example.com"]),
            user("user-2", &["two@example.com"]),
        ];

        let responses = f
            .mailer
            .deliver(&mut TxContext::mock(), &envelope(Some(kind_id())), recipients)
            .await
            .unwrap();

        assert_ne!(responses[0].notification_id, responses[1].notification_id);
        let mut enqueued: Vec<_> = deliveries(&f.queue)
            .iter()
            .map(|d| d.message_id.to_string())
            .collect();
        let mut returned: Vec<_> = responses.iter().map(|r| r.notification_id.clone()).collect();
        enqueued.sort();
        returned.sort();
        assert_eq!(enqueued, returned);
    }

    #[tokio::test]
    async fn test_全体の配信停止はsubscribed_falseになる() {
        let f = setup();
        f.unsubscribes.unsubscribe_globally(guid("user-1"));

        f.mailer
            .deliver(
                &mut TxContext::mock(),
                &envelope(Some(kind_id())),
                vec![user("user-1", &["one@example.com"])],
            )
            .await
            .unwrap();

        assert!(!deliveries(&f.queue)[0].subscribed);
    }

    #[tokio::test]
    async fn test_種別単位の配信停止はsubscribed_falseになる() {
        let f = setup();
        f.unsubscribes.unsubscribe(guid("user-1"), client_id(), kind_id());

        f.mailer
            .deliver(
                &mut TxContext::mock(),
                &envelope(Some(kind_id())),
                vec![
                    user("user-1", &["one@example.com"]),
                    user("user-2", &["two@example.com"]),
                ],
            )
            .await
            .unwrap();

        let subscribed: Vec<_> = deliveries(&f.queue)
            .into_iter()
            .map(|d| (d.user_guid.unwrap().into_string(), d.subscribed))
            .collect();
        assert!(subscribed.contains(&("user-1".to_string(), false)));
        assert!(subscribed.contains(&("user-2".to_string(), true)));
    }

    #[tokio::test]
    async fn test_他の種別の配信停止は影響しない() {
        let f = setup();
        f.unsubscribes.unsubscribe(
            guid("user-1"),
            client_id(),
            KindId::new("other").unwrap(),
        );

        f.mailer
            .deliver(
                &mut TxContext::mock(),
                &envelope(Some(kind_id())),
                vec![user("user-1", &["one@example.com"])],
            )
            .await
            .unwrap();

        assert!(deliveries(&f.queue)[0].subscribed);
    }

    #[tokio::test]
    async fn test_エンキューしたユーザーの受信記録を作成する() {
        let f = setup();

        f.mailer
            .deliver(
                &mut TxContext::mock(),
                &envelope(Some(kind_id())),
                vec![
                    user("user-1", &["one@example.com"]),
                    user("user-2", &[]),
                    Recipient::Missing(guid("ghost")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            f.receipts.receipts(),
            vec![(guid("user-1"), client_id(), kind_id())]
        );
    }

    #[tokio::test]
    async fn test_メール宛ては配信停止を確認せず受信記録も作らない() {
        let f = setup();

        let responses = f
            .mailer
            .deliver(
                &mut TxContext::mock(),
                &envelope(None),
                vec![Recipient::Email("someone@example.com".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(responses[0].status, ResponseStatus::Queued);
        assert_eq!(responses[0].recipient, "someone@example.com");
        let delivery = &deliveries(&f.queue)[0];
        assert!(delivery.subscribed);
        assert_eq!(delivery.user_guid, None);
        assert!(f.receipts.receipts().is_empty());
    }

    #[tokio::test]
    async fn test_同じ宛先に2回送ると別々のメッセージidになる() {
        let f = setup();
        let envelope = envelope(Some(kind_id()));

        let first = f
            .mailer
            .deliver(&mut TxContext::mock(), &envelope, vec![user("user-1", &["one@example.com"])])
            .await
            .unwrap();
        let second = f
            .mailer
            .deliver(&mut TxContext::mock(), &envelope, vec![user("user-1", &["one@example.com"])])
            .await
            .unwrap();

        assert_ne!(first[0].notification_id, second[0].notification_id);
        assert_eq!(f.queue.len(), 2);
        assert_eq!(f.receipts.receipts().len(), 1);
    }
}
