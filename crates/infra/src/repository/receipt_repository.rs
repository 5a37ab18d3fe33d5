//! # ReceiptRepository
//!
//! ユーザーが（クライアント, 種別）の通知を受け取ったことを記録する。
//! 同じ組を何度記録しても 1 行のまま。

use async_trait::async_trait;
use notifyd_domain::{
    client::{ClientId, KindId},
    directory::UserGuid,
};

use crate::{db::TxContext, error::InfraError};

/// 受信記録リポジトリトレイト
#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// 受信記録をまとめて作成する（既存の組は無視）
    async fn create_receipts(
        &self,
        tx: &mut TxContext,
        user_guids: &[UserGuid],
        client_id: &ClientId,
        kind_id: &KindId,
    ) -> Result<(), InfraError>;
}

/// PostgreSQL 実装の ReceiptRepository
#[derive(Debug, Clone, Default)]
pub struct PostgresReceiptRepository;

impl PostgresReceiptRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReceiptRepository for PostgresReceiptRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(count = user_guids.len()))]
    async fn create_receipts(
        &self,
        tx: &mut TxContext,
        user_guids: &[UserGuid],
        client_id: &ClientId,
        kind_id: &KindId,
    ) -> Result<(), InfraError> {
        if user_guids.is_empty() {
            return Ok(());
        }

        let guids: Vec<&str> = user_guids.iter().map(UserGuid::as_str).collect();
        sqlx::query(
            r#"
            INSERT INTO receipts (user_guid, client_id, kind_id)
            SELECT guid, $2, $3 FROM UNNEST($1::text[]) AS guid
            ON CONFLICT (user_guid, client_id, kind_id) DO NOTHING
            "#,
        )
        .bind(guids)
        .bind(client_id.as_str())
        .bind(kind_id.as_str())
        .execute(tx.conn()?)
        .await?;

        Ok(())
    }
}
