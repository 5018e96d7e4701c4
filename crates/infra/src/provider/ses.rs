//! SES 送信実装
//!
//! AWS SES v2 API を使用してメールを送信する。本番環境で使用する。
//!
//! 認証情報はユーザーごとに異なる（配信メッセージに同梱される [`ProviderKeys`]）ため、
//! クライアントはアクセスキー ID とリージョンの組ごとに作成してキャッシュする。

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use aws_sdk_sesv2::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    operation::send_email::SendEmailError,
    types::{Body, Content, Destination, EmailContent, Message, MessageTag},
};
use mailcast_domain::{
    provider::{OutboundEmail, ProviderOutcome},
    user::ProviderKeys,
};

use super::EmailProvider;

/// SES 送信
pub struct SesEmailProvider {
    clients: Mutex<HashMap<(String, String), Client>>,
}

impl SesEmailProvider {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// 認証情報に対応するクライアントを取得する（なければ作成してキャッシュ）
    fn client_for(&self, keys: &ProviderKeys) -> Client {
        let cache_key = (keys.access_key_id.clone(), keys.region.clone());
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        clients
            .entry(cache_key)
            .or_insert_with(|| {
                let credentials = Credentials::new(
                    keys.access_key_id.clone(),
                    keys.secret_access_key.clone(),
                    None,
                    None,
                    "mailcast-provider-keys",
                );
                let config = aws_sdk_sesv2::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(keys.region.clone()))
                    .credentials_provider(credentials)
                    .build();
                Client::from_conf(config)
            })
            .clone()
    }

    fn build_content(email: &OutboundEmail) -> Result<EmailContent, String> {
        let subject = Content::builder()
            .data(&email.subject)
            .charset("UTF-8")
            .build()
            .map_err(|e| format!("件名構築失敗: {e}"))?;
        let html = Content::builder()
            .data(&email.html_body)
            .charset("UTF-8")
            .build()
            .map_err(|e| format!("HTML 本文構築失敗: {e}"))?;
        let text = Content::builder()
            .data(&email.text_body)
            .charset("UTF-8")
            .build()
            .map_err(|e| format!("テキスト本文構築失敗: {e}"))?;

        Ok(EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(subject)
                    .body(Body::builder().html(html).text(text).build())
                    .build(),
            )
            .build())
    }

    fn build_tags(email: &OutboundEmail) -> Result<Vec<MessageTag>, String> {
        email
            .tags
            .iter()
            .map(|(name, value)| {
                MessageTag::builder()
                    .name(name)
                    .value(value)
                    .build()
                    .map_err(|e| format!("メッセージタグ構築失敗: {e}"))
            })
            .collect()
    }
}

impl Default for SesEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// SES のサービスエラーを送信結果に分類する
///
/// 内容・送信元・設定の問題は再試行しても解消しないため終端失敗とする。
/// スロットリング・送信上限・一時停止などそれ以外はすべて再試行可能とする。
pub fn classify_send_error(error: &SendEmailError) -> ProviderOutcome {
    match error {
        SendEmailError::MessageRejected(_) => ProviderOutcome::TerminalRejected,
        SendEmailError::MailFromDomainNotVerifiedException(_) => {
            ProviderOutcome::TerminalUnverified
        }
        SendEmailError::NotFoundException(_) => ProviderOutcome::TerminalConfigMissing,
        other => ProviderOutcome::Retryable {
            reason: format!("SES 送信失敗: {}", DisplayErrorContext(other)),
        },
    }
}

fn classify_sdk_error<R>(error: SdkError<SendEmailError, R>) -> ProviderOutcome
where
    R: std::fmt::Debug,
{
    match error.as_service_error() {
        Some(service_error) => classify_send_error(service_error),
        // タイムアウト・接続失敗など、SES に届いたか分からないもの
        None => ProviderOutcome::Retryable {
            reason: format!("SES 通信失敗: {}", DisplayErrorContext(&error)),
        },
    }
}

#[async_trait]
impl EmailProvider for SesEmailProvider {
    #[tracing::instrument(skip_all, level = "debug", fields(to = %email.to))]
    async fn send(&self, email: &OutboundEmail) -> ProviderOutcome {
        let content = match Self::build_content(email) {
            Ok(content) => content,
            Err(reason) => {
                tracing::warn!(%reason, "SES リクエストを構築できません");
                return ProviderOutcome::TerminalRejected;
            }
        };
        let tags = match Self::build_tags(email) {
            Ok(tags) => tags,
            Err(reason) => {
                tracing::warn!(%reason, "SES リクエストを構築できません");
                return ProviderOutcome::TerminalRejected;
            }
        };

        let result = self
            .client_for(&email.provider_keys)
            .send_email()
            .from_email_address(&email.source)
            .destination(Destination::builder().to_addresses(&email.to).build())
            .content(content)
            .set_email_tags(Some(tags))
            .set_configuration_set_name(email.configuration_set.clone())
            .send()
            .await;

        match result {
            Ok(output) => ProviderOutcome::Success {
                message_id: output.message_id().unwrap_or_default().to_string(),
            },
            Err(e) => classify_sdk_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_sesv2::types::error::{
        BadRequestException,
        MailFromDomainNotVerifiedException,
        MessageRejected,
        NotFoundException,
        TooManyRequestsException,
    };
    use rstest::rstest;

    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SesEmailProvider>();
    }

    #[rstest]
    #[case(
        SendEmailError::MessageRejected(MessageRejected::builder().message("rejected").build()),
        ProviderOutcome::TerminalRejected
    )]
    #[case(
        SendEmailError::MailFromDomainNotVerifiedException(
            MailFromDomainNotVerifiedException::builder().message("unverified").build()
        ),
        ProviderOutcome::TerminalUnverified
    )]
    #[case(
        SendEmailError::NotFoundException(NotFoundException::builder().message("no config set").build()),
        ProviderOutcome::TerminalConfigMissing
    )]
    fn 終端エラーはカテゴリごとに分類される(
        #[case] error: SendEmailError,
        #[case] expected: ProviderOutcome,
    ) {
        assert_eq!(classify_send_error(&error), expected);
    }

    #[test]
    fn スロットリングは再試行可能() {
        let error = SendEmailError::TooManyRequestsException(
            TooManyRequestsException::builder().message("slow down").build(),
        );

        assert!(matches!(
            classify_send_error(&error),
            ProviderOutcome::Retryable { .. }
        ));
    }

    #[test]
    fn 分類外のサービスエラーは再試行可能() {
        let error = SendEmailError::BadRequestException(
            BadRequestException::builder().message("bad").build(),
        );

        assert!(matches!(
            classify_send_error(&error),
            ProviderOutcome::Retryable { .. }
        ));
    }

    #[tokio::test]
    async fn 同じ認証情報にはクライアントを使い回す() {
        let provider = SesEmailProvider::new();
        let keys = ProviderKeys {
            access_key_id:     "AKIA1".to_string(),
            secret_access_key: "secret".to_string(),
            region:            "us-east-1".to_string(),
        };
        let other_region = ProviderKeys {
            region: "eu-west-1".to_string(),
            ..keys.clone()
        };

        provider.client_for(&keys);
        provider.client_for(&keys);
        provider.client_for(&other_region);

        assert_eq!(provider.clients.lock().unwrap().len(), 2);
    }
}
