//! Noop 送信実装
//!
//! メールを実際に送信せず、ログ出力のみ行う。負荷試験や送信無効化時に使用する。

use async_trait::async_trait;
use mailcast_domain::provider::{OutboundEmail, ProviderOutcome};
use uuid::Uuid;

use super::EmailProvider;

/// Noop 送信（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct NoopEmailProvider;

#[async_trait]
impl EmailProvider for NoopEmailProvider {
    async fn send(&self, email: &OutboundEmail) -> ProviderOutcome {
        let message_id = format!("noop-{}", Uuid::now_v7());
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            %message_id,
            "Noop: メール送信をスキップ"
        );
        ProviderOutcome::Success { message_id }
    }
}

#[cfg(test)]
mod tests {
    use mailcast_domain::user::ProviderKeys;

    use super::*;

    #[tokio::test]
    async fn sendは合成メッセージidで成功を返す() {
        let email = OutboundEmail {
            to:                "test@example.com".to_string(),
            source:            "news@example.com".to_string(),
            subject:           "テスト件名".to_string(),
            html_body:         "<p>テスト</p>".to_string(),
            text_body:         "テスト".to_string(),
            configuration_set: None,
            tags:              vec![],
            provider_keys:     ProviderKeys {
                access_key_id:     String::new(),
                secret_access_key: String::new(),
                region:            String::new(),
            },
        };

        let outcome = NoopEmailProvider.send(&email).await;

        assert!(matches!(
            outcome,
            ProviderOutcome::Success { message_id } if message_id.starts_with("noop-")
        ));
    }
}
