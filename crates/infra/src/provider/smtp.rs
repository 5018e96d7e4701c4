//! SMTP 送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//! 開発環境では Mailpit（ローカル SMTP サーバー）に接続する。
//! 認証情報・構成セット・メッセージタグは SES 固有のため使わない。

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Message, MultiPart, SinglePart, header::ContentType},
};
use mailcast_domain::provider::{OutboundEmail, ProviderOutcome};

use super::EmailProvider;

/// SMTP 送信
pub struct SmtpEmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailProvider {
    /// # 引数
    ///
    /// - `host`: SMTP サーバーのホスト名（例: "localhost"）
    /// - `port`: SMTP サーバーのポート番号（例: 1025 for Mailpit）
    pub fn new(host: &str, port: u16) -> Self {
        // builder_dangerous: TLS なしで接続（Mailpit 等のローカル SMTP 向け）
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Self { transport }
    }

    fn build_message(email: &OutboundEmail) -> Result<Message, String> {
        Message::builder()
            .from(
                email
                    .source
                    .parse()
                    .map_err(|e| format!("送信元アドレス不正: {e}"))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| format!("宛先アドレス不正: {e}"))?)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| format!("メッセージ構築失敗: {e}"))
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    #[tracing::instrument(skip_all, level = "debug", fields(to = %email.to))]
    async fn send(&self, email: &OutboundEmail) -> ProviderOutcome {
        let message = match Self::build_message(email) {
            Ok(message) => message,
            Err(reason) => {
                tracing::warn!(%reason, "SMTP メッセージを構築できません");
                return ProviderOutcome::TerminalRejected;
            }
        };

        match self.transport.send(message).await {
            Ok(response) => ProviderOutcome::Success {
                message_id: response.message().collect::<Vec<_>>().join(" "),
            },
            // 5xx 応答
            Err(e) if e.is_permanent() => {
                tracing::warn!(error = %e, "SMTP サーバーがメッセージを拒否しました");
                ProviderOutcome::TerminalRejected
            }
            Err(e) => ProviderOutcome::Retryable {
                reason: format!("SMTP 送信失敗: {e}"),
            },
        }
    }
}
