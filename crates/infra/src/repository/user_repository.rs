//! # UserRepository
//!
//! キャンペーン所有者と送信プロバイダ設定の読み取り専用リポジトリ。
//! 認証情報の登録・更新は外部コンポーネントの責務。

use async_trait::async_trait;
use mailcast_domain::user::{ProviderKeys, User, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// ユーザーごとの送信プロバイダ設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub keys:                     ProviderKeys,
    /// SES に構成セット（名前 = ユーザー UUID）を作成済みか
    pub configuration_set_exists: bool,
}

/// ユーザーリポジトリトレイト
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, InfraError>;

    /// 送信プロバイダ設定を取得する（未登録なら `None`）
    async fn find_provider_settings(
        &self,
        id: &UserId,
    ) -> Result<Option<ProviderSettings>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id:    Uuid,
    uuid:  Uuid,
    email: String,
    name:  String,
}

#[derive(sqlx::FromRow)]
struct ProviderKeysRow {
    access_key_id:            String,
    secret_access_key:        String,
    region:                   String,
    configuration_set_exists: bool,
}

/// PostgreSQL 実装の UserRepository
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, InfraError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, uuid, email, name FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| User {
            id:    UserId::from_uuid(row.id),
            uuid:  row.uuid,
            email: row.email,
            name:  row.name,
        }))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_provider_settings(
        &self,
        id: &UserId,
    ) -> Result<Option<ProviderSettings>, InfraError> {
        let row = sqlx::query_as::<_, ProviderKeysRow>(
            r#"
            SELECT access_key_id, secret_access_key, region, configuration_set_exists
            FROM provider_keys
            WHERE user_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ProviderSettings {
            keys:                     ProviderKeys {
                access_key_id:     row.access_key_id,
                secret_access_key: row.secret_access_key,
                region:            row.region,
            },
            configuration_set_exists: row.configuration_set_exists,
        }))
    }
}
