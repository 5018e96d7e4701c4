//! # 送信プロバイダ
//!
//! 1 通のメールをプロバイダに送信し、結果を [`ProviderOutcome`] に分類する。
//!
//! - **trait による抽象化**: `EmailProvider` trait で送信先を抽象化
//! - **3 つの実装**: SES（本番用）、SMTP（Mailpit 開発用）、Noop（テスト用）
//! - **環境変数切替**: `EMAIL_PROVIDER` でランタイム選択
//! - **エラーは値で返す**: SDK のエラーは実装内で分類し、呼び出し側には閉じた列挙型だけを渡す

mod noop;
mod ses;
mod smtp;

use async_trait::async_trait;
use mailcast_domain::provider::{OutboundEmail, ProviderOutcome};
pub use noop::NoopEmailProvider;
pub use ses::{SesEmailProvider, classify_send_error};
pub use smtp::SmtpEmailProvider;

/// メール送信トレイト
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// メールを 1 通送信し、結果を分類して返す
    async fn send(&self, email: &OutboundEmail) -> ProviderOutcome;
}
