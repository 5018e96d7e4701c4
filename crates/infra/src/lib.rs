//! # Mailcast インフラ層
//!
//! 配信パイプラインが使う外部システムとの接続・通信を担当する。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プール管理とマイグレーション
//! - **リポジトリ実装**: キャンペーン・スケジュール・購読者・送信ログの永続化
//! - **ページング**: 購読者集合のキーセット走査
//! - **メッセージキュー**: SQS による at-least-once 配送
//! - **重複排除キャッシュ**: Redis による送信の 1 回化
//! - **送信プロバイダ**: SES / SMTP / Noop
//! - **テンプレート**: tera による件名・本文の生成
//!
//! ## 依存関係
//!
//! ```text
//! dispatcher → infra → domain
//!      ↓
//!    shared
//! ```
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use mailcast_infra::{cache::RedisDedupCache, db, queue};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::create_pool("postgres://localhost/mailcast", 10).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let cache = RedisDedupCache::new("redis://localhost:6379").await?;
//!     let sqs = queue::create_client("ap-northeast-1", Some("http://localhost:9324")).await;
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod pagination;
pub mod provider;
pub mod queue;
pub mod repository;
pub mod template;

pub use error::InfraError;
pub use pagination::SubscriberPager;
