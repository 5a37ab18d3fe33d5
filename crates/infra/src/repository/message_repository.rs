//! # MessageRepository
//!
//! 配信結果（メッセージ ID ごとのステータス）の永続化を担当する。
//!
//! ## 設計方針
//!
//! - **最後の結果で上書き**: リトライのたびに同じメッセージ ID の行を更新する。
//!   `created_at` は最初の記録時刻のまま残し、保持期間の起点にする
//! - **バッチ削除**: GC は件数上限付きで削除し、長いロックを避ける

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notifyd_domain::{
    message::{Message, MessageStatus},
    notification::MessageId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 配信結果リポジトリトレイト
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// ステータスを記録する（既存なら更新）
    async fn upsert_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError>;

    /// ID で配信結果を取得する
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, InfraError>;

    /// `cutoff` より前に作成された配信結果を最大 `limit` 件削除し、削除件数を返す
    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, InfraError>;
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id:         Uuid,
    status:     String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// PostgreSQL 実装の MessageRepository
#[derive(Debug, Clone)]
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(message_id = %id, %status))]
    async fn upsert_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let status: &'static str = status.into();
        sqlx::query(
            r#"
            INSERT INTO messages (id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(message_id = %id))]
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, InfraError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, status, created_at, updated_at FROM messages WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let status: MessageStatus = row.status.parse().map_err(|_| {
                InfraError::unexpected(format!("不正な配信ステータス: {}", row.status))
            })?;
            Ok(Message {
                id: MessageId::from_uuid(row.id),
                status,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, InfraError> {
        let result = sqlx::query(
            r#"
            DELETE FROM messages
            WHERE id IN (
                SELECT id FROM messages
                WHERE created_at < $1
                ORDER BY created_at
                LIMIT $2
            )
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
