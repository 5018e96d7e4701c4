//! # SegmentRepository
//!
//! セグメントの存在確認に使う読み取り専用リポジトリ。

use async_trait::async_trait;
use mailcast_domain::{
    segment::{Segment, SegmentId},
    user::UserId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// セグメントリポジトリトレイト
#[async_trait]
pub trait SegmentRepository: Send + Sync {
    /// ユーザーが所有するセグメントのうち、ID が一致するものを返す
    ///
    /// 存在しない ID・他ユーザーの ID は無視する。
    async fn find_by_ids(
        &self,
        user_id: &UserId,
        ids: &[SegmentId],
    ) -> Result<Vec<Segment>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    id:      Uuid,
    user_id: Uuid,
    name:    String,
}

/// PostgreSQL 実装の SegmentRepository
#[derive(Debug, Clone)]
pub struct PostgresSegmentRepository {
    pool: PgPool,
}

impl PostgresSegmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentRepository for PostgresSegmentRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%user_id, count = ids.len()))]
    async fn find_by_ids(
        &self,
        user_id: &UserId,
        ids: &[SegmentId],
    ) -> Result<Vec<Segment>, InfraError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query_as::<_, SegmentRow>(
            r#"
            SELECT id, user_id, name
            FROM segments
            WHERE user_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Segment {
                id:      SegmentId::from_uuid(row.id),
                user_id: UserId::from_uuid(row.user_id),
                name:    row.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresSegmentRepository>();
    }
}
