//! # リポジトリ実装
//!
//! 配信パイプラインが読み書きする永続化操作のトレイトと PostgreSQL 実装。
//!
//! - **トレイト経由**: ユースケースは `Arc<dyn XxxRepository>` だけを受け取る
//! - **実行時クエリ**: `sqlx::query_as` + `FromRow` の行型で読み、ドメイン型へ変換する
//! - **ユーザースコープ**: 状態更新は `(id, user_id)` で絞り込む

pub mod campaign_repository;
pub mod schedule_repository;
pub mod segment_repository;
pub mod send_log_repository;
pub mod subscriber_repository;
pub mod template_repository;
pub mod user_repository;

pub use campaign_repository::{CampaignRepository, PostgresCampaignRepository};
pub use schedule_repository::{PostgresScheduleRepository, ScheduleRepository};
pub use segment_repository::{PostgresSegmentRepository, SegmentRepository};
pub use send_log_repository::{PostgresSendLogRepository, SendLogRepository};
pub use subscriber_repository::{PostgresSubscriberRepository, SubscriberRepository};
pub use template_repository::{PostgresTemplateRepository, TemplateRepository};
pub use user_repository::{PostgresUserRepository, ProviderSettings, UserRepository};
