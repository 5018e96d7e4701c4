//! # CampaignRepository
//!
//! キャンペーンの取得と状態更新を担当するリポジトリ。
//!
//! 状態更新は `(id, user_id)` に加えて遷移元の状態で絞り込む条件付き更新
//! （compare-and-set）。行ロックは取らず、先に遷移した側が勝つ。

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_domain::{
    campaign::{Campaign, CampaignId, CampaignStatus},
    template::TemplateId,
    user::UserId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// キャンペーンリポジトリトレイト
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// ID でキャンペーンを取得する
    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<Campaign>, InfraError>;

    /// 保存済みの状態が `expected_from` のいずれかである場合に限り、
    /// 状態と完了時刻を保存する
    ///
    /// 行を更新したら `true`。状態が既に先へ進んでいる、または該当行がない
    /// （別ユーザーの ID など）場合は何も書かずに `false` を返す。
    async fn update_status(
        &self,
        campaign: &Campaign,
        expected_from: &[CampaignStatus],
    ) -> Result<bool, InfraError>;
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id:           Uuid,
    user_id:      Uuid,
    template_id:  Uuid,
    name:         String,
    status:       String,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = InfraError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let status = CampaignStatus::from_str(&row.status)
            .map_err(|e| InfraError::unexpected(e.to_string()))?;

        Ok(Campaign::from_db(
            CampaignId::from_uuid(row.id),
            UserId::from_uuid(row.user_id),
            TemplateId::from_uuid(row.template_id),
            row.name,
            status,
            row.completed_at,
        ))
    }
}

/// PostgreSQL 実装の CampaignRepository
#[derive(Debug, Clone)]
pub struct PostgresCampaignRepository {
    pool: PgPool,
}

impl PostgresCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for PostgresCampaignRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<Campaign>, InfraError> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, user_id, template_id, name, status, completed_at
            FROM campaigns
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Campaign::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %campaign.id(), status = %campaign.status()))]
    async fn update_status(
        &self,
        campaign: &Campaign,
        expected_from: &[CampaignStatus],
    ) -> Result<bool, InfraError> {
        let status: &'static str = campaign.status().into();
        let expected: Vec<&'static str> = expected_from.iter().map(|s| (*s).into()).collect();

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $3, completed_at = $4, updated_at = now()
            WHERE id = $1 AND user_id = $2 AND status = ANY($5)
            "#,
        )
        .bind(campaign.id().as_uuid())
        .bind(campaign.user_id().as_uuid())
        .bind(status)
        .bind(campaign.completed_at())
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
