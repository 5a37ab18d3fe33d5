//! # メッセージ GC
//!
//! 保持期間を過ぎた配信結果レコードを一定間隔で削除する。
//! ジョブキューには触れない。

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use notifyd_domain::clock::Clock;
use notifyd_infra::{InfraError, repository::MessageRepository};
use notifyd_shared::{
    event_log::{error as log_error, event},
    log_business_event,
};
use tokio::sync::watch;

/// 1 回の DELETE で削除する最大件数
const DEFAULT_BATCH_SIZE: i64 = 1000;

/// メッセージ GC
pub struct MessageGc {
    messages:   Arc<dyn MessageRepository>,
    clock:      Arc<dyn Clock>,
    retention:  Duration,
    interval:   StdDuration,
    batch_size: i64,
}

impl MessageGc {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        clock: Arc<dyn Clock>,
        retention: Duration,
        interval: StdDuration,
    ) -> Self {
        Self {
            messages,
            clock,
            retention,
            interval,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 保持期間を過ぎたレコードをすべて削除し、削除件数を返す
    ///
    /// バッチ単位で削除し、1 バッチが上限に満たなくなったら終了する。
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn sweep(&self) -> Result<u64, InfraError> {
        let cutoff = self.clock.now() - self.retention;
        let mut purged = 0;

        loop {
            let deleted = self
                .messages
                .delete_created_before(cutoff, self.batch_size)
                .await?;
            purged += deleted;
            if deleted < self.batch_size.unsigned_abs() {
                break;
            }
        }

        if purged > 0 {
            log_business_event!(
                event.category = event::category::MAINTENANCE,
                event.action = event::action::MESSAGES_PURGED,
                event.entity_type = event::entity_type::MESSAGE,
                event.result = event::result::SUCCESS,
                purged,
                cutoff = %cutoff,
                "期限切れの配信結果を削除"
            );
        }
        Ok(purged)
    }

    /// シャットダウンまで一定間隔で掃除を繰り返す
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.num_seconds(),
            "メッセージ GC を開始しました"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sweep().await {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::DATABASE,
                    span_trace = %e.span_trace(),
                    "配信結果の削除に失敗しました: {}",
                    e
                );
            }
        }

        tracing::info!("メッセージ GC を停止しました");
    }
}
