//! # Mailcast 共有ユーティリティ
//!
//! 全クレート（domain を除く）から使われる観測性のユーティリティを提供する。
//!
//! - ビジネスロジックを含まない
//! - tracing の初期化は `observability` feature の背後に置く（ライブラリクレートは不要）

pub mod event_log;
pub mod observability;
