//! # ClientRepository
//!
//! 通知を送るクライアント（呼び出し元アプリケーション）の永続化を担当する。
//!
//! ## 設計方針
//!
//! - **明示登録と暗黙登録の区別**: `register` は送信元名を上書きし、`ensure` は
//!   既存の行に触れない。通知 API からは `ensure` のみを使う
//! - **テンプレート割り当ては保持**: どちらの登録でも `template_id` は変更しない

use async_trait::async_trait;
use notifyd_domain::client::{Client, ClientId, TemplateId};

use crate::{db::TxContext, error::InfraError};

/// クライアントリポジトリトレイト
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// クライアントを登録する（既存なら送信元名を更新）
    async fn register(&self, tx: &mut TxContext, client: &Client) -> Result<(), InfraError>;

    /// クライアントが存在しなければ作成する
    async fn ensure(&self, tx: &mut TxContext, id: &ClientId) -> Result<(), InfraError>;

    /// ID でクライアントを取得する
    async fn find_by_id(
        &self,
        tx: &mut TxContext,
        id: &ClientId,
    ) -> Result<Option<Client>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id:          String,
    source_name: String,
    template_id: Option<String>,
}

impl TryFrom<ClientRow> for Client {
    type Error = InfraError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        Ok(Client {
            id:          ClientId::new(row.id).map_err(|e| InfraError::unexpected(e.to_string()))?,
            source_name: row.source_name,
            template_id: row
                .template_id
                .map(TemplateId::new)
                .transpose()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
        })
    }
}

/// PostgreSQL 実装の ClientRepository
#[derive(Debug, Clone, Default)]
pub struct PostgresClientRepository;

impl PostgresClientRepository {
    /// 新しいリポジトリインスタンスを作成
    ///
    /// すべての操作が呼び出し元のトランザクション上で行われるため、プールは持たない。
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClientRepository for PostgresClientRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(client_id = %client.id))]
    async fn register(&self, tx: &mut TxContext, client: &Client) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO clients (id, source_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET source_name = EXCLUDED.source_name, updated_at = now()
            "#,
        )
        .bind(client.id.as_str())
        .bind(&client.source_name)
        .execute(tx.conn()?)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(client_id = %id))]
    async fn ensure(&self, tx: &mut TxContext, id: &ClientId) -> Result<(), InfraError> {
        sqlx::query("INSERT INTO clients (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id.as_str())
            .execute(tx.conn()?)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(client_id = %id))]
    async fn find_by_id(
        &self,
        tx: &mut TxContext,
        id: &ClientId,
    ) -> Result<Option<Client>, InfraError> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, source_name, template_id FROM clients WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(tx.conn()?)
        .await?;

        row.map(Client::try_from).transpose()
    }
}
