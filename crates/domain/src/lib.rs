//! # Mailcast ドメイン層
//!
//! キャンペーン配信パイプラインのドメインモデルを定義する。
//! I/O は一切行わない。
//!
//! ## 依存関係の方向
//!
//! ```text
//! dispatcher → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`campaign`] - キャンペーン・状態遷移・配信スケジュール
//! - [`subscriber`] - 購読者とキーセットページングのカーソル
//! - [`template`] - テンプレート変数の抽出と検証
//! - [`message`] - 段間のキューメッセージ
//! - [`provider`] - 送信要求と送信結果の分類
//! - [`send_log`] - 追記専用の送信ログ
//!
//! ## 使用例
//!
//! ```rust
//! use mailcast_domain::{DomainError, campaign::CampaignId};
//!
//! let id = CampaignId::new();
//! let error = DomainError::NotFound {
//!     entity_type: "Campaign",
//!     id:          id.to_string(),
//! };
//! assert!(error.to_string().contains("Campaign"));
//! ```

#[macro_use]
mod macros;

pub mod campaign;
pub mod clock;
pub mod error;
pub mod message;
pub mod provider;
pub mod segment;
pub mod send_log;
pub mod subscriber;
pub mod template;
pub mod user;

pub use error::DomainError;
