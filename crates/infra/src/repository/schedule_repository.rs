//! # ScheduleRepository
//!
//! 配信スケジュールの取得と削除を担当するリポジトリ。
//! スケジュールの作成・差し替えは外部コンポーネントの責務。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_domain::{
    campaign::{CampaignId, CampaignSchedule, CampaignScheduleId, SenderIdentity},
    segment::SegmentId,
    user::UserId,
};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::error::InfraError;

/// 配信スケジュールリポジトリトレイト
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// `scheduled_at <= now` のスケジュールを古い順に取得する
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<CampaignSchedule>, InfraError>;

    /// スケジュールを削除する（存在しなくても成功）
    async fn delete(&self, id: &CampaignScheduleId) -> Result<(), InfraError>;
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id:             Uuid,
    campaign_id:    Uuid,
    user_id:        Uuid,
    scheduled_at:   DateTime<Utc>,
    segment_ids:    Vec<Uuid>,
    template_data:  Json<HashMap<String, String>>,
    sender_address: String,
    sender_name:    String,
}

impl From<ScheduleRow> for CampaignSchedule {
    fn from(row: ScheduleRow) -> Self {
        Self {
            id:            CampaignScheduleId::from_uuid(row.id),
            campaign_id:   CampaignId::from_uuid(row.campaign_id),
            user_id:       UserId::from_uuid(row.user_id),
            scheduled_at:  row.scheduled_at,
            segment_ids:   row.segment_ids.into_iter().map(SegmentId::from_uuid).collect(),
            template_data: row.template_data.0,
            sender:        SenderIdentity {
                address: row.sender_address,
                name:    row.sender_name,
            },
        }
    }
}

/// PostgreSQL 実装の ScheduleRepository
#[derive(Debug, Clone)]
pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<CampaignSchedule>, InfraError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, campaign_id, user_id, scheduled_at, segment_ids,
                   template_data, sender_address, sender_name
            FROM campaign_schedules
            WHERE scheduled_at <= $1
            ORDER BY scheduled_at, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CampaignSchedule::from).collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn delete(&self, id: &CampaignScheduleId) -> Result<(), InfraError> {
        sqlx::query("DELETE FROM campaign_schedules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresScheduleRepository>();
    }
}
