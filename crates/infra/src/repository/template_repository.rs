//! # TemplateRepository
//!
//! クライアントや種別に割り当てられた DB 管理のテンプレートを取得する。

use async_trait::async_trait;
use notifyd_domain::client::{Template, TemplateId};
use sqlx::PgPool;

use crate::error::InfraError;

/// テンプレートリポジトリトレイト
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// ID でテンプレートを取得する
    async fn find_by_id(&self, id: &TemplateId) -> Result<Option<Template>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id:      String,
    name:    String,
    subject: String,
    text:    String,
    html:    String,
}

/// PostgreSQL 実装の TemplateRepository
#[derive(Debug, Clone)]
pub struct PostgresTemplateRepository {
    pool: PgPool,
}

impl PostgresTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PostgresTemplateRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(template_id = %id))]
    async fn find_by_id(&self, id: &TemplateId) -> Result<Option<Template>, InfraError> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, name, subject, text, html FROM templates WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Template {
                id:      TemplateId::new(row.id)
                    .map_err(|e| InfraError::unexpected(e.to_string()))?,
                name:    row.name,
                subject: row.subject,
                text:    row.text,
                html:    row.html,
            })
        })
        .transpose()
    }
}
