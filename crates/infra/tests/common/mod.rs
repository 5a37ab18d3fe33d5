//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用する時刻・キュー・シードデータのヘルパー。
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use notifyd_domain::{
    client::{ClientId, KindId},
    clock::ManualClock,
    directory::UserGuid,
    job::{JobId, RetryPolicy, WorkerId},
};
use notifyd_infra::{
    PgTransactionManager,
    TransactionManager,
    queue::{JobQueue, PostgresJobQueue, QueueSettings},
};
use sqlx::PgPool;

/// テスト用の固定日時
pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn worker(name: &str) -> WorkerId {
    WorkerId::new(name).unwrap()
}

pub fn user(guid: &str) -> UserGuid {
    UserGuid::new(guid).unwrap()
}

pub fn client_id() -> ClientId {
    ClientId::new("billing").unwrap()
}

pub fn kind_id() -> KindId {
    KindId::new("invoice.ready").unwrap()
}

/// テスト用のキュー設定（基本遅延 10 秒、上限 3 回、リース 60 秒）
pub fn test_settings() -> QueueSettings {
    QueueSettings {
        retry_policy:  RetryPolicy::new(3, Duration::seconds(10), Duration::minutes(5)),
        lease:         Duration::seconds(60),
        poll_interval: StdDuration::from_millis(200),
    }
}

/// 手動で進められる時計付きのキューを作成する
pub fn create_queue(pool: &PgPool) -> (PostgresJobQueue, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(test_now()));
    let queue = PostgresJobQueue::new(pool.clone(), clock.clone(), test_settings());
    (queue, clock)
}

/// 1 件エンキューしてコミットする
pub async fn enqueue_committed(
    queue: &PostgresJobQueue,
    pool: &PgPool,
    payload: serde_json::Value,
) -> JobId {
    let mut tx = PgTransactionManager::new(pool.clone()).begin().await.unwrap();
    let id = queue.enqueue(&mut tx, payload).await.unwrap();
    tx.commit().await.unwrap();
    id
}

/// ジョブの状態と試行回数を直接読む
pub async fn job_row(pool: &PgPool, id: &JobId) -> Option<(String, i32)> {
    sqlx::query_as("SELECT state, attempts FROM jobs WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await
        .unwrap()
}
