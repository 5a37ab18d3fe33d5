//! # 配信ワーカー
//!
//! ジョブキューから配信ジョブを予約し、メールを組み立てて送信し、結果を記録する。
//!
//! ## 結果の扱い
//!
//! | 結果 | 配信結果ステータス | ジョブ |
//! |-----|------------------|-------|
//! | 送信成功 | `delivered` | `succeed` |
//! | 配信停止中 | `unsubscribed` | `succeed`（送信しない） |
//! | 送信経路に到達できない | `unavailable` | `fail`（リトライ） |
//! | 拒否 | `failed` | `fail`（リトライ） |
//! | レンダリング失敗 | `failed` | `discard`（リトライしない） |
//! | ペイロードを復元できない | 記録しない | `fail` |
//!
//! ## 設計方針
//!
//! - **ワーカーは互いに独立**: 1 つのワーカーのエラーは他のワーカーの予約ループを止めない
//! - **シャットダウンは予約待ちの間だけ割り込む**: 処理中のジョブは最後まで処理してから終了する
//! - **エラーでループを抜けない**: DB エラーはログに残し、少し待ってから予約を再開する

use std::{sync::Arc, time::Duration as StdDuration};

use notifyd_domain::{
    DomainError,
    clock::Clock,
    job::{FailOutcome, Job, WorkerId},
    message::MessageStatus,
    notification::{Delivery, NotificationError},
};
use notifyd_infra::{
    InfraError,
    notification::NotificationSender,
    queue::JobQueue,
    repository::MessageRepository,
};
use notifyd_shared::{
    event_log::{error as log_error, event},
    log_business_event,
};
use tokio::{sync::watch, task::JoinHandle};

use super::renderer::MessageRenderer;

/// DB エラー後に予約を再開するまでの待ち時間
const ERROR_BACKOFF: StdDuration = StdDuration::from_secs(1);

/// ジョブ 1 件の処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// 送信して完了した
    Delivered,
    /// 配信停止中のため送信せずに完了した
    Unsubscribed,
    /// 失敗としてキューに戻した、または恒久失敗にした
    Failed {
        /// 記録した配信結果。ペイロードを復元できなかった場合は `None`
        status:  Option<MessageStatus>,
        outcome: FailOutcome,
    },
}

/// 配信ワーカー
#[derive(Clone)]
pub struct DeliveryWorker {
    id:           WorkerId,
    queue:        Arc<dyn JobQueue>,
    messages:     Arc<dyn MessageRepository>,
    sender:       Arc<dyn NotificationSender>,
    renderer:     MessageRenderer,
    clock:        Arc<dyn Clock>,
    reserve_wait: StdDuration,
}

impl DeliveryWorker {
    pub fn new(
        id: WorkerId,
        queue: Arc<dyn JobQueue>,
        messages: Arc<dyn MessageRepository>,
        sender: Arc<dyn NotificationSender>,
        renderer: MessageRenderer,
        clock: Arc<dyn Clock>,
        reserve_wait: StdDuration,
    ) -> Self {
        Self {
            id,
            queue,
            messages,
            sender,
            renderer,
            clock,
            reserve_wait,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// 同じ依存を共有するワーカーを `count` 個起動する
    ///
    /// ワーカー ID は `{instance_index}-worker-{n}`。
    pub fn spawn_pool(
        &self,
        count: usize,
        instance_index: u32,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, DomainError> {
        (0..count)
            .map(|n| -> Result<_, DomainError> {
                let worker = Self {
                    id: WorkerId::new(format!("{instance_index}-worker-{n}"))?,
                    ..self.clone()
                };
                Ok(tokio::spawn(worker.run(shutdown.clone())))
            })
            .collect()
    }

    /// シャットダウンまで予約と処理を繰り返す
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker_id = %self.id, "配信ワーカーを開始しました");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let reserved = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                reserved = self.queue.reserve(&self.id, self.reserve_wait) => reserved,
            };

            let result = match reserved {
                Ok(Some(job)) => self.process(job).await.map(|_| ()),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::QUEUE,
                    worker_id = %self.id,
                    span_trace = %e.span_trace(),
                    "配信ジョブの処理に失敗しました: {}",
                    e
                );
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }

        tracing::info!(worker_id = %self.id, "配信ワーカーを停止しました");
    }

    /// 予約可能なジョブを 1 件処理する（待機しない）
    ///
    /// キューが空なら `None`。
    pub async fn process_next(&self) -> Result<Option<ProcessOutcome>, InfraError> {
        match self.queue.try_reserve(&self.id).await? {
            Some(job) => self.process(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// 予約済みのジョブを処理する
    #[tracing::instrument(skip_all, fields(worker_id = %self.id, job_id = %job.id, attempts = job.attempts))]
    pub async fn process(&self, job: Job) -> Result<ProcessOutcome, InfraError> {
        let delivery = match job.delivery() {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::PAYLOAD,
                    "配信レコードを復元できません: {}",
                    e
                );
                let outcome = self.queue.fail(&job).await?;
                log_fail_outcome(&job, outcome);
                return Ok(ProcessOutcome::Failed {
                    status: None,
                    outcome,
                });
            }
        };

        if !delivery.subscribed {
            self.messages
                .upsert_status(
                    &delivery.message_id,
                    MessageStatus::Unsubscribed,
                    self.clock.now(),
                )
                .await?;
            self.queue.succeed(&job).await?;

            log_business_event!(
                event.category = event::category::NOTIFICATION,
                event.action = event::action::NOTIFICATION_SKIPPED,
                event.entity_type = event::entity_type::MESSAGE,
                event.entity_id = %delivery.message_id,
                event.client_id = %delivery.client_id,
                event.result = event::result::SUCCESS,
                "配信停止中のため送信をスキップ"
            );
            return Ok(ProcessOutcome::Unsubscribed);
        }

        match self.send(&delivery).await {
            Ok(()) => {
                self.messages
                    .upsert_status(
                        &delivery.message_id,
                        MessageStatus::Delivered,
                        self.clock.now(),
                    )
                    .await?;
                self.queue.succeed(&job).await?;

                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_DELIVERED,
                    event.entity_type = event::entity_type::MESSAGE,
                    event.entity_id = %delivery.message_id,
                    event.client_id = %delivery.client_id,
                    event.result = event::result::SUCCESS,
                    "通知を送信"
                );
                Ok(ProcessOutcome::Delivered)
            }
            Err(e) => {
                let (status, action, kind) = match &e {
                    NotificationError::Unavailable(_) => (
                        MessageStatus::Unavailable,
                        event::action::NOTIFICATION_UNAVAILABLE,
                        log_error::kind::MAIL_TRANSPORT,
                    ),
                    NotificationError::Rejected(_) => (
                        MessageStatus::Failed,
                        event::action::NOTIFICATION_FAILED,
                        log_error::kind::MAIL_TRANSPORT,
                    ),
                    NotificationError::TemplateFailed(_) => (
                        MessageStatus::Failed,
                        event::action::NOTIFICATION_FAILED,
                        log_error::kind::TEMPLATE,
                    ),
                };
                tracing::warn!(
                    error.category = log_error::category::EXTERNAL_SERVICE,
                    error.kind = kind,
                    message_id = %delivery.message_id,
                    "通知を送信できませんでした: {}",
                    e
                );

                self.messages
                    .upsert_status(&delivery.message_id, status, self.clock.now())
                    .await?;
                let outcome = if e.is_retryable() {
                    self.queue.fail(&job).await?
                } else {
                    // 同じペイロードでは何度描画しても失敗する
                    self.queue.discard(&job).await?;
                    FailOutcome::Exhausted {
                        attempts: job.attempts + 1,
                    }
                };

                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = action,
                    event.entity_type = event::entity_type::MESSAGE,
                    event.entity_id = %delivery.message_id,
                    event.client_id = %delivery.client_id,
                    event.result = event::result::FAILURE,
                    "通知の送信に失敗"
                );
                log_fail_outcome(&job, outcome);

                Ok(ProcessOutcome::Failed {
                    status: Some(status),
                    outcome,
                })
            }
        }
    }

    async fn send(&self, delivery: &Delivery) -> Result<(), NotificationError> {
        let email = self.renderer.render(delivery)?;
        self.sender.send_email(&email).await
    }
}

fn log_fail_outcome(job: &Job, outcome: FailOutcome) {
    match outcome {
        FailOutcome::Retry {
            attempts,
            available_at,
        } => {
            log_business_event!(
                event.category = event::category::QUEUE,
                event.action = event::action::JOB_RETRY_SCHEDULED,
                event.entity_type = event::entity_type::JOB,
                event.entity_id = %job.id,
                event.result = event::result::FAILURE,
                attempts,
                available_at = %available_at,
                "ジョブのリトライを予定"
            );
        }
        FailOutcome::Exhausted { attempts } => {
            log_business_event!(
                event.category = event::category::QUEUE,
                event.action = event::action::JOB_EXHAUSTED,
                event.entity_type = event::entity_type::JOB,
                event.entity_id = %job.id,
                event.result = event::result::FAILURE,
                attempts,
                "ジョブがリトライ上限に達しました"
            );
        }
    }
}
