//! # 永続ジョブキュー
//!
//! 配信ジョブを PostgreSQL の `jobs` テーブルに保持するキュー。
//! HTTP リクエスト処理（エンキュー）とメール送信（ワーカー）を切り離す。
//!
//! ## 設計方針
//!
//! - **行ロックによる排他予約**: `FOR UPDATE SKIP LOCKED` で 1 ジョブを同時に
//!   1 ワーカーだけが予約する。複数プロセスでも同じ保証になる
//! - **少なくとも 1 回**: 送信後 `succeed` 前にクラッシュすると再送されうる
//! - **起こし合図 + 定期ポーリング**: エンキューと同じトランザクションで
//!   `pg_notify` を発行し、コミット時に待機中のワーカーを起こす。
//!   取りこぼした合図は `poll_interval` ごとの再確認で回収する
//! - **リース**: `lease` を超えて予約されたままのジョブは再予約可能になる
//!
//! ## 操作
//!
//! | 操作 | 効果 |
//! |------|------|
//! | `enqueue` | state=queued, attempts=0, available_at=now で挿入 |
//! | `reserve` | 最古の予約可能ジョブを reserved にして返す（最大 `max_wait` 待機） |
//! | `succeed` | 行を削除 |
//! | `fail` | attempts を加算し、上限未満ならバックオフして queued、上限で行を削除 |
//! | `discard` | 再試行しても結果が変わらないジョブの行を削除 |
//! | `unlock` | reserved のジョブをすべて queued に戻す（起動時、リーダーのみ） |

use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use notifyd_domain::{
    clock::Clock,
    job::{FailOutcome, Job, JobId, JobState, RetryPolicy, WorkerId},
};
use sqlx::{PgPool, postgres::PgListener};
use tokio::{
    sync::{Notify, watch},
    time::Instant,
};
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

/// 起こし合図に使う LISTEN/NOTIFY チャネル
pub const WAKE_CHANNEL: &str = "notifyd_jobs";

/// ジョブキュー trait
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// ジョブを登録する
    ///
    /// 呼び出し元のトランザクション内で挿入し、コミットされるまで予約対象にならない。
    async fn enqueue(
        &self,
        tx: &mut TxContext,
        payload: serde_json::Value,
    ) -> Result<JobId, InfraError>;

    /// 予約可能なジョブがあれば予約して返す（待機しない）
    async fn try_reserve(&self, worker_id: &WorkerId) -> Result<Option<Job>, InfraError>;

    /// 予約可能なジョブを最大 `max_wait` 待って予約する
    ///
    /// 期限までに見つからなければ `None` を返す。
    async fn reserve(
        &self,
        worker_id: &WorkerId,
        max_wait: StdDuration,
    ) -> Result<Option<Job>, InfraError>;

    /// 完了したジョブを削除する
    async fn succeed(&self, job: &Job) -> Result<(), InfraError>;

    /// 失敗を記録し、再試行するか恒久失敗にするかを返す
    ///
    /// 恒久失敗になったジョブは削除する。
    async fn fail(&self, job: &Job) -> Result<FailOutcome, InfraError>;

    /// 再試行せずにジョブを削除する
    async fn discard(&self, job: &Job) -> Result<(), InfraError>;

    /// 予約中のジョブをすべて queued に戻し、戻した件数を返す
    async fn unlock(&self) -> Result<u64, InfraError>;
}

/// キューの動作設定
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub retry_policy:  RetryPolicy,
    /// 予約のリース期間
    pub lease:         Duration,
    /// 待機中の再確認間隔
    pub poll_interval: StdDuration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            retry_policy:  RetryPolicy::default(),
            lease:         Duration::minutes(10),
            poll_interval: StdDuration::from_secs(1),
        }
    }
}

/// 起こし合図を待ちながら予約を繰り返す
///
/// 予約を試す前に `notified()` を有効化しておくことで、確認と待機の間に
/// 届いた合図を取りこぼさない。
pub(crate) async fn reserve_with_wake<Q>(
    queue: &Q,
    wake: &Notify,
    worker_id: &WorkerId,
    max_wait: StdDuration,
    poll_interval: StdDuration,
) -> Result<Option<Job>, InfraError>
where
    Q: JobQueue + ?Sized,
{
    let deadline = Instant::now() + max_wait;
    loop {
        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(job) = queue.try_reserve(worker_id).await? {
            return Ok(Some(job));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        let wait = (deadline - now).min(poll_interval);
        // タイムアウトは再確認の合図として扱う
        let _ = tokio::time::timeout(wait, notified).await;
    }
}

/// ジッタを `0..=bound` の範囲でランダムに選ぶ
pub(crate) fn random_jitter(bound: Duration) -> Duration {
    let bound_ms = bound.num_milliseconds().max(0);
    Duration::milliseconds(rand::random_range(0..=bound_ms))
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id:           Uuid,
    payload:      serde_json::Value,
    state:        String,
    attempts:     i32,
    available_at: DateTime<Utc>,
    reserved_by:  Option<String>,
    created_at:   DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = InfraError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state: JobState = row
            .state
            .parse()
            .map_err(|_| InfraError::unexpected(format!("不正なジョブ状態: {}", row.state)))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| InfraError::unexpected(format!("不正な試行回数: {}", row.attempts)))?;
        let reserved_by = row
            .reserved_by
            .map(WorkerId::new)
            .transpose()
            .map_err(|e| InfraError::unexpected(e.to_string()))?;

        Ok(Job {
            id: JobId::from_uuid(row.id),
            payload: row.payload,
            state,
            attempts,
            available_at: row.available_at,
            reserved_by,
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL 実装の JobQueue
pub struct PostgresJobQueue {
    pool:     PgPool,
    clock:    Arc<dyn Clock>,
    settings: QueueSettings,
    wake:     Arc<Notify>,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        Self {
            pool,
            clock,
            settings,
            wake: Arc::new(Notify::new()),
        }
    }

    /// LISTEN して待機中のワーカーを起こすタスクを作る
    pub fn waker(&self) -> QueueWaker {
        QueueWaker {
            pool: self.pool.clone(),
            wake: Arc::clone(&self.wake),
        }
    }

    fn held_by(job: &Job) -> Result<&WorkerId, InfraError> {
        job.reserved_by
            .as_ref()
            .ok_or_else(|| InfraError::conflict("Job", job.id.to_string()))
    }

    /// 自分が予約しているジョブの行を削除する
    async fn delete_held(&self, job: &Job) -> Result<(), InfraError> {
        let worker_id = Self::held_by(job)?;

        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND reserved_by = $2")
            .bind(job.id.as_uuid())
            .bind(worker_id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            // リース切れで別ワーカーに移った。そちらの結果に任せる
            tracing::warn!(
                job_id = %job.id,
                worker = %worker_id,
                "削除時にジョブの予約が失われていました"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn enqueue(
        &self,
        tx: &mut TxContext,
        payload: serde_json::Value,
    ) -> Result<JobId, InfraError> {
        let id = JobId::new();
        let now = self.clock.now();
        let conn = tx.conn()?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, payload, state, attempts, available_at, created_at, updated_at)
            VALUES ($1, $2, 'queued', 0, $3, $3, $3)
            "#,
        )
        .bind(id.as_uuid())
        .bind(payload)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        // コミット時に配送される。同一トランザクション内の同じ合図は 1 つにまとめられる
        sqlx::query("SELECT pg_notify($1, '')")
            .bind(WAKE_CHANNEL)
            .execute(&mut *conn)
            .await?;

        Ok(id)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(worker = %worker_id))]
    async fn try_reserve(&self, worker_id: &WorkerId) -> Result<Option<Job>, InfraError> {
        let now = self.clock.now();
        let lease_cutoff = now - self.settings.lease;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = 'reserved', reserved_by = $1, reserved_at = $2, updated_at = $2
            WHERE id = (
                SELECT id FROM jobs
                WHERE (state = 'queued' AND available_at <= $2)
                   OR (state = 'reserved' AND reserved_at < $3)
                ORDER BY available_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, state, attempts, available_at, reserved_by, created_at
            "#,
        )
        .bind(worker_id.as_str())
        .bind(now)
        .bind(lease_cutoff)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn reserve(
        &self,
        worker_id: &WorkerId,
        max_wait: StdDuration,
    ) -> Result<Option<Job>, InfraError> {
        reserve_with_wake(
            self,
            &self.wake,
            worker_id,
            max_wait,
            self.settings.poll_interval,
        )
        .await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(job_id = %job.id))]
    async fn succeed(&self, job: &Job) -> Result<(), InfraError> {
        self.delete_held(job).await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(job_id = %job.id))]
    async fn fail(&self, job: &Job) -> Result<FailOutcome, InfraError> {
        let worker_id = Self::held_by(job)?;
        let mut tx = self.pool.begin().await?;

        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT attempts FROM jobs
            WHERE id = $1 AND state = 'reserved' AND reserved_by = $2
            FOR UPDATE
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(worker_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(attempts) = attempts else {
            return Err(InfraError::conflict("Job", job.id.to_string()));
        };
        let attempts = u32::try_from(attempts).unwrap_or_default();

        let now = self.clock.now();
        let jitter = random_jitter(self.settings.retry_policy.jitter_bound());
        let outcome = self
            .settings
            .retry_policy
            .on_failure(attempts, now, jitter);

        match outcome {
            FailOutcome::Retry {
                attempts,
                available_at,
            } => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'queued', attempts = $2, available_at = $3,
                        reserved_by = NULL, reserved_at = NULL, updated_at = $4
                    WHERE id = $1
                    "#,
                )
                .bind(job.id.as_uuid())
                .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
                .bind(available_at)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            FailOutcome::Exhausted { .. } => {
                sqlx::query("DELETE FROM jobs WHERE id = $1")
                    .bind(job.id.as_uuid())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(job_id = %job.id))]
    async fn discard(&self, job: &Job) -> Result<(), InfraError> {
        self.delete_held(job).await
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn unlock(&self) -> Result<u64, InfraError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'queued', reserved_by = NULL, reserved_at = NULL, updated_at = $1
            WHERE state = 'reserved'
            "#,
        )
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// `LISTEN` した合図を待機中のワーカーに中継するタスク
pub struct QueueWaker {
    pool: PgPool,
    wake: Arc<Notify>,
}

impl QueueWaker {
    /// シャットダウンまで LISTEN を続ける
    ///
    /// 接続が切れたら再接続する。再接続の間に届いた合図は失われるため、
    /// 再接続のたびに全ワーカーを起こす。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            match self.listen(&mut shutdown).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(
                        error.category = "infrastructure",
                        error.kind = "queue",
                        error = %e,
                        "ジョブキューの LISTEN が切断されました。再接続します"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.changed() => return,
                () = tokio::time::sleep(StdDuration::from_secs(1)) => {}
            }
        }
    }

    async fn listen(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(WAKE_CHANNEL).await?;
        self.wake.notify_waiters();
        tracing::debug!(channel = WAKE_CHANNEL, "ジョブキューの LISTEN を開始しました");

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                notification = listener.recv() => {
                    notification?;
                    self.wake.notify_waiters();
                }
            }
        }
    }
}
