//! # KindRepository
//!
//! クライアントごとの通知種別の永続化を担当する。
//!
//! 種別はクライアント ID と種別 ID の組で一意になる。

use async_trait::async_trait;
use notifyd_domain::client::{ClientId, Kind, KindId, TemplateId};

use crate::{db::TxContext, error::InfraError};

/// 通知種別リポジトリトレイト
#[async_trait]
pub trait KindRepository: Send + Sync {
    /// 種別を登録する（既存なら説明と critical フラグを更新）
    async fn register(&self, tx: &mut TxContext, kind: &Kind) -> Result<(), InfraError>;

    /// 種別が存在しなければ作成する
    async fn ensure(
        &self,
        tx: &mut TxContext,
        id: &KindId,
        client_id: &ClientId,
    ) -> Result<(), InfraError>;

    /// 種別を取得する
    async fn find(
        &self,
        tx: &mut TxContext,
        id: &KindId,
        client_id: &ClientId,
    ) -> Result<Option<Kind>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct KindRow {
    id:          String,
    client_id:   String,
    description: String,
    critical:    bool,
    template_id: Option<String>,
}

impl TryFrom<KindRow> for Kind {
    type Error = InfraError;

    fn try_from(row: KindRow) -> Result<Self, Self::Error> {
        let invalid = |e: notifyd_domain::DomainError| InfraError::unexpected(e.to_string());
        Ok(Kind {
            id:          KindId::new(row.id).map_err(invalid)?,
            client_id:   ClientId::new(row.client_id).map_err(invalid)?,
            description: row.description,
            critical:    row.critical,
            template_id: row
                .template_id
                .map(TemplateId::new)
                .transpose()
                .map_err(invalid)?,
        })
    }
}

/// PostgreSQL 実装の KindRepository
#[derive(Debug, Clone, Default)]
pub struct PostgresKindRepository;

impl PostgresKindRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl KindRepository for PostgresKindRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(kind_id = %kind.id))]
    async fn register(&self, tx: &mut TxContext, kind: &Kind) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO kinds (id, client_id, description, critical)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id, client_id) DO UPDATE
            SET description = EXCLUDED.description,
                critical = EXCLUDED.critical,
                updated_at = now()
            "#,
        )
        .bind(kind.id.as_str())
        .bind(kind.client_id.as_str())
        .bind(&kind.description)
        .bind(kind.critical)
        .execute(tx.conn()?)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(kind_id = %id))]
    async fn ensure(
        &self,
        tx: &mut TxContext,
        id: &KindId,
        client_id: &ClientId,
    ) -> Result<(), InfraError> {
        sqlx::query(
            "INSERT INTO kinds (id, client_id) VALUES ($1, $2) ON CONFLICT (id, client_id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(client_id.as_str())
        .execute(tx.conn()?)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(kind_id = %id))]
    async fn find(
        &self,
        tx: &mut TxContext,
        id: &KindId,
        client_id: &ClientId,
    ) -> Result<Option<Kind>, InfraError> {
        let row = sqlx::query_as::<_, KindRow>(
            r#"
            SELECT id, client_id, description, critical, template_id
            FROM kinds
            WHERE id = $1 AND client_id = $2
            "#,
        )
        .bind(id.as_str())
        .bind(client_id.as_str())
        .fetch_optional(tx.conn()?)
        .await?;

        row.map(Kind::try_from).transpose()
    }
}
