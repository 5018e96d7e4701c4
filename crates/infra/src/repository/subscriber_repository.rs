//! # SubscriberRepository
//!
//! 購読者をキーセットページングで読み出すリポジトリ。
//!
//! ## クエリ
//!
//! - `(created_at, id) > (cursor)` の行値比較で「カーソルの次から」を表す
//! - セグメント所属は `EXISTS` で判定する。JOIN と違い、複数セグメントに
//!   所属する購読者が重複しない
//! - `subscribers (user_id, created_at, id)` インデックスで範囲走査になる

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_domain::{
    subscriber::{Subscriber, SubscriberId, SubscriberPageRequest},
    user::UserId,
};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::error::InfraError;

/// 購読者リポジトリトレイト
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// 条件に合う購読者を `(created_at, id)` 昇順で最大 `limit` 件返す
    ///
    /// - `request.after` より厳密に後ろの行だけを返す
    /// - 対象セグメントのいずれかに所属する購読者を 1 回だけ返す
    /// - `created_until` より後に作成された行は返さない
    async fn find_page(&self, request: &SubscriberPageRequest)
    -> Result<Vec<Subscriber>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id:          Uuid,
    user_id:     Uuid,
    email:       String,
    name:        String,
    metadata:    Json<HashMap<String, String>>,
    active:      bool,
    blacklisted: bool,
    created_at:  DateTime<Utc>,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        Self {
            id:          SubscriberId::from_uuid(row.id),
            user_id:     UserId::from_uuid(row.user_id),
            email:       row.email,
            name:        row.name,
            metadata:    row.metadata.0,
            active:      row.active,
            blacklisted: row.blacklisted,
            created_at:  row.created_at,
        }
    }
}

/// PostgreSQL 実装の SubscriberRepository
#[derive(Debug, Clone)]
pub struct PostgresSubscriberRepository {
    pool: PgPool,
}

impl PostgresSubscriberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberRepository for PostgresSubscriberRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(user_id = %request.filter.user_id, limit = request.limit)
    )]
    async fn find_page(
        &self,
        request: &SubscriberPageRequest,
    ) -> Result<Vec<Subscriber>, InfraError> {
        let filter = &request.filter;
        if filter.segment_ids.is_empty() || request.limit == 0 {
            return Ok(Vec::new());
        }

        let segment_ids: Vec<Uuid> = filter.segment_ids.iter().map(|id| *id.as_uuid()).collect();
        let (after_created_at, after_id) = match &request.after {
            Some(cursor) => (Some(cursor.created_at), Some(cursor.id)),
            None => (None, None),
        };

        let rows = sqlx::query_as::<_, SubscriberRow>(
            r#"
            SELECT s.id, s.user_id, s.email, s.name, s.metadata,
                   s.active, s.blacklisted, s.created_at
            FROM subscribers s
            WHERE s.user_id = $1
              AND s.created_at <= $2
              AND ($3::timestamptz IS NULL OR (s.created_at, s.id) > ($3::timestamptz, $4::uuid))
              AND (NOT $5 OR s.blacklisted = FALSE)
              AND (NOT $6 OR s.active = TRUE)
              AND EXISTS (
                  SELECT 1
                  FROM segment_subscribers ss
                  WHERE ss.subscriber_id = s.id
                    AND ss.segment_id = ANY($7)
              )
            ORDER BY s.created_at, s.id
            LIMIT $8
            "#,
        )
        .bind(filter.user_id.as_uuid())
        .bind(filter.created_until)
        .bind(after_created_at)
        .bind(after_id)
        .bind(filter.exclude_blacklisted)
        .bind(filter.require_active)
        .bind(&segment_ids)
        .bind(i64::from(request.limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscriber::from).collect())
    }
}
