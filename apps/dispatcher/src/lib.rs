//! # Mailcast Dispatcher
//!
//! キャンペーンメールの配信パイプライン。
//!
//! - [`usecase::Scheduler`]: 配信時刻を過ぎた予約をディスパッチキューへ投入する
//! - [`usecase::Campaigner`]: ディスパッチメッセージを購読者ごとの配信メッセージに展開する
//! - [`usecase::Sender`]: 配信メッセージ 1 通につきメールを 1 通送る
//!
//! キューの消費は [`worker::QueueConsumer`] が共通で担う。

pub mod config;
pub mod error;
pub mod usecase;
pub mod worker;
