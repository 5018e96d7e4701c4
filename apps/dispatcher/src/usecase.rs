//! # ユースケース層
//!
//! 配信パイプラインの 3 ステージを実装する。
//!
//! ```text
//! Scheduler ──dispatch queue──▶ Campaigner ──delivery queue──▶ Sender ──▶ send_logs
//!     │                             │                             │
//!     └── campaigns.status          └── campaigns.status          └── dedup cache
//! ```
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリ・キュー・キャッシュ・プロバイダを `Arc<dyn Trait>` で外部から注入
//! - **失敗の分類**: ハンドラは [`HandleOutcome`](crate::worker::HandleOutcome) を返し、
//!   エラーをワーカープールへ伝播させない
//! - **時刻**: `Utc::now()` を直接呼ばず、[`Clock`](mailcast_domain::clock::Clock) 経由で取得する

pub mod campaigner;
pub mod scheduler;
pub mod sender;

pub use campaigner::{Campaigner, CampaignerSettings};
pub use scheduler::{Scheduler, ScheduleOutcome, TickReport};
pub use sender::Sender;
