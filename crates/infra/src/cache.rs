//! # 送信重複排除キャッシュ
//!
//! キューの再配信で同じ配信メッセージが複数回処理されても、
//! プロバイダへの送信を 1 回に抑えるためのキャッシュ。
//!
//! ## Redis キー設計
//!
//! | キー | 値 | TTL |
//! |-----|-----|-----|
//! | `dedup:send:{sha256(event_id:subscriber_id)}` | `1` | 259200秒（3日） |
//!
//! 2 つのワーカーが同じメッセージを同時に処理する競合は
//! `SET key 1 NX EX ttl` の原子性で解決する。

use std::time::Duration;

use async_trait::async_trait;
use mailcast_domain::{campaign::EventId, subscriber::SubscriberId};
use redis::{AsyncCommands, aio::ConnectionManager};
use sha2::{Digest, Sha256};

use crate::InfraError;

/// 送信重複排除キーの既定の有効期限（3日）
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(259_200);

const DEDUP_KEY_PREFIX: &str = "dedup:send:";

/// `(event_id, subscriber_id)` から決定的な重複排除キーを作る
pub fn dedup_key(event_id: &EventId, subscriber_id: &SubscriberId) -> String {
    let digest = Sha256::digest(format!("{}:{}", event_id, subscriber_id).as_bytes());
    format!("{}{}", DEDUP_KEY_PREFIX, hex::encode(digest))
}

/// 重複排除キャッシュのインターフェース
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// キーが存在しなければ TTL 付きで設定する
    ///
    /// 設定できた（＝初回）なら `true`、既に存在したなら `false`。
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, InfraError>;

    /// キーが存在するか
    async fn exists(&self, key: &str) -> Result<bool, InfraError>;

    /// キーを削除する（存在しなくてもエラーにしない）
    async fn delete(&self, key: &str) -> Result<(), InfraError>;
}

/// Redis を使用した重複排除キャッシュ
pub struct RedisDedupCache {
    conn: ConnectionManager,
}

impl RedisDedupCache {
    /// # 引数
    ///
    /// - `redis_url`: Redis 接続 URL（例: `redis://localhost:6379`）
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl DedupCache for RedisDedupCache {
    #[tracing::instrument(skip_all, level = "debug", fields(%key))]
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, InfraError> {
        let mut conn = self.conn.clone();

        // NX で既存なら nil が返る
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, InfraError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%key))]
    async fn delete(&self, key: &str) -> Result<(), InfraError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn dedup_keyは同じ組に対して決定的() {
        let event_id = EventId::new();
        let subscriber_id = SubscriberId::new();

        assert_eq!(
            dedup_key(&event_id, &subscriber_id),
            dedup_key(&event_id, &subscriber_id)
        );
    }

    #[test]
    fn dedup_keyは購読者が違えば異なる() {
        let event_id = EventId::new();

        assert_ne!(
            dedup_key(&event_id, &SubscriberId::new()),
            dedup_key(&event_id, &SubscriberId::new())
        );
    }

    #[test]
    fn dedup_keyはプレフィックスと小文字16進のsha256() {
        let event_id = EventId::from_uuid(Uuid::nil());
        let subscriber_id = SubscriberId::from_uuid(Uuid::nil());

        let key = dedup_key(&event_id, &subscriber_id);
        let digest = key.strip_prefix("dedup:send:").unwrap();

        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(
            digest,
            hex::encode(Sha256::digest(
                "00000000-0000-0000-0000-000000000000:00000000-0000-0000-0000-000000000000"
            ))
        );
    }

    #[test]
    fn 既定のttlは3日() {
        assert_eq!(DEFAULT_DEDUP_TTL.as_secs(), 3 * 24 * 60 * 60);
    }
}
