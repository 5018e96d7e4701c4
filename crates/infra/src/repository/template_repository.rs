//! # TemplateRepository
//!
//! メールテンプレートの読み取り専用リポジトリ。

use async_trait::async_trait;
use mailcast_domain::{
    template::{Template, TemplateId},
    user::UserId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// テンプレートリポジトリトレイト
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// ユーザーが所有するテンプレートを ID で取得する
    async fn find_by_id(
        &self,
        id: &TemplateId,
        user_id: &UserId,
    ) -> Result<Option<Template>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id:           Uuid,
    user_id:      Uuid,
    name:         String,
    subject_part: String,
    html_part:    String,
    text_part:    String,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Self {
            id:           TemplateId::from_uuid(row.id),
            user_id:      UserId::from_uuid(row.user_id),
            name:         row.name,
            subject_part: row.subject_part,
            html_part:    row.html_part,
            text_part:    row.text_part,
        }
    }
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
    #[tracing::instrument(skip_all, level = "debug", fields(%id, %user_id))]
    async fn find_by_id(
        &self,
        id: &TemplateId,
        user_id: &UserId,
    ) -> Result<Option<Template>, InfraError> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, user_id, name, subject_part, html_part, text_part
            FROM templates
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Template::from))
    }
}
