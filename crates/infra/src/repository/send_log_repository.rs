//! # SendLogRepository
//!
//! 送信ログの永続化を担当するリポジトリ。追記専用で、更新・削除は提供しない。

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_domain::{
    campaign::{CampaignId, EventId},
    send_log::{SendLog, SendLogId, SendStatus},
    subscriber::SubscriberId,
    user::UserId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 送信ログリポジトリトレイト
#[async_trait]
pub trait SendLogRepository: Send + Sync {
    /// 送信ログを 1 行追記する
    async fn insert(&self, log: &SendLog) -> Result<(), InfraError>;

    /// イベント（1 回のディスパッチ）に属する送信ログを ID 順に取得する
    async fn find_by_event(&self, event_id: &EventId) -> Result<Vec<SendLog>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct SendLogRow {
    id:            Uuid,
    event_id:      Uuid,
    user_id:       Uuid,
    subscriber_id: Option<Uuid>,
    campaign_id:   Uuid,
    status:        String,
    description:   String,
    message_id:    Option<String>,
    created_at:    DateTime<Utc>,
}

impl TryFrom<SendLogRow> for SendLog {
    type Error = InfraError;

    fn try_from(row: SendLogRow) -> Result<Self, Self::Error> {
        let status =
            SendStatus::from_str(&row.status).map_err(|e| InfraError::unexpected(e.to_string()))?;

        Ok(Self {
            id: SendLogId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            user_id: UserId::from_uuid(row.user_id),
            subscriber_id: row.subscriber_id.map(SubscriberId::from_uuid),
            campaign_id: CampaignId::from_uuid(row.campaign_id),
            status,
            description: row.description,
            message_id: row.message_id,
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL 実装の SendLogRepository
#[derive(Debug, Clone)]
pub struct PostgresSendLogRepository {
    pool: PgPool,
}

impl PostgresSendLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SendLogRepository for PostgresSendLogRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %log.id, status = %log.status))]
    async fn insert(&self, log: &SendLog) -> Result<(), InfraError> {
        let status: &'static str = log.status.into();

        sqlx::query(
            r#"
            INSERT INTO send_logs (
                id, event_id, user_id, subscriber_id, campaign_id,
                status, description, message_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(log.id.as_uuid())
        .bind(log.event_id.as_uuid())
        .bind(log.user_id.as_uuid())
        .bind(log.subscriber_id.as_ref().map(|id| *id.as_uuid()))
        .bind(log.campaign_id.as_uuid())
        .bind(status)
        .bind(&log.description)
        .bind(log.message_id.as_deref())
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%event_id))]
    async fn find_by_event(&self, event_id: &EventId) -> Result<Vec<SendLog>, InfraError> {
        let rows = sqlx::query_as::<_, SendLogRow>(
            r#"
            SELECT id, event_id, user_id, subscriber_id, campaign_id,
                   status, description, message_id, created_at
            FROM send_logs
            WHERE event_id = $1
            ORDER BY id
            "#,
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SendLog::try_from).collect()
    }
}
