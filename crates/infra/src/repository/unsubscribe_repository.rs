//! # UnsubscribeRepository
//!
//! ユーザーの配信停止設定を参照する。
//!
//! ## 設計方針
//!
//! - **2 段階の判定**: 全体の配信停止を先に確認し、該当しなければ
//!   （ユーザー, クライアント, 種別）単位の停止を確認する
//! - **行の有無が停止を表す**: 行が存在すれば停止中とみなす

use async_trait::async_trait;
use notifyd_domain::{
    client::{ClientId, KindId},
    directory::UserGuid,
};

use crate::{db::TxContext, error::InfraError};

/// 配信停止設定リポジトリトレイト
#[async_trait]
pub trait UnsubscribeRepository: Send + Sync {
    /// すべての通知を停止しているか
    async fn is_globally_unsubscribed(
        &self,
        tx: &mut TxContext,
        user_guid: &UserGuid,
    ) -> Result<bool, InfraError>;

    /// 指定クライアントの指定種別を停止しているか
    async fn is_unsubscribed(
        &self,
        tx: &mut TxContext,
        user_guid: &UserGuid,
        client_id: &ClientId,
        kind_id: &KindId,
    ) -> Result<bool, InfraError>;
}

/// PostgreSQL 実装の UnsubscribeRepository
#[derive(Debug, Clone, Default)]
pub struct PostgresUnsubscribeRepository;

impl PostgresUnsubscribeRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UnsubscribeRepository for PostgresUnsubscribeRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(user_guid = %user_guid))]
    async fn is_globally_unsubscribed(
        &self,
        tx: &mut TxContext,
        user_guid: &UserGuid,
    ) -> Result<bool, InfraError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM global_unsubscribes WHERE user_guid = $1)",
        )
        .bind(user_guid.as_str())
        .fetch_one(tx.conn()?)
        .await?;

        Ok(exists)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(user_guid = %user_guid))]
    async fn is_unsubscribed(
        &self,
        tx: &mut TxContext,
        user_guid: &UserGuid,
        client_id: &ClientId,
        kind_id: &KindId,
    ) -> Result<bool, InfraError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM unsubscribes
                WHERE user_guid = $1 AND client_id = $2 AND kind_id = $3
            )
            "#,
        )
        .bind(user_guid.as_str())
        .bind(client_id.as_str())
        .bind(kind_id.as_str())
        .fetch_one(tx.conn()?)
        .await?;

        Ok(exists)
    }
}
