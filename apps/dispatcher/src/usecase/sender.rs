//! # センダー（配信）
//!
//! 配信メッセージ 1 通につき、プロバイダ経由でメールを 1 通送る。
//!
//! 同じ `(event_id, subscriber_id)` の送信はキャッシュのキーで 1 回に絞る。
//! 一時的な失敗ではキーを消してからメッセージを残し、再配信時に送り直せるようにする。

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use mailcast_domain::{
    clock::Clock,
    message::DeliveryMessage,
    provider::{OutboundEmail, ProviderOutcome},
    send_log::SendLog,
};
use mailcast_infra::{
    cache::{DedupCache, dedup_key},
    provider::EmailProvider,
    queue::ReceivedMessage,
    repository::SendLogRepository,
};
use mailcast_shared::{
    event_log::{self, event},
    log_business_event,
};

use crate::worker::{HandleOutcome, MessageHandler};

/// プロバイダに付けるメッセージタグ名
const TAG_CAMPAIGN_ID: &str = "campaign_id";
const TAG_USER_ID: &str = "user_id";

/// センダー
pub struct Sender {
    cache:     Arc<dyn DedupCache>,
    provider:  Arc<dyn EmailProvider>,
    send_logs: Arc<dyn SendLogRepository>,
    clock:     Arc<dyn Clock>,
    dedup_ttl: Duration,
}

impl Sender {
    pub fn new(
        cache: Arc<dyn DedupCache>,
        provider: Arc<dyn EmailProvider>,
        send_logs: Arc<dyn SendLogRepository>,
        clock: Arc<dyn Clock>,
        dedup_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            provider,
            send_logs,
            clock,
            dedup_ttl,
        }
    }

    /// 配信メッセージを 1 通送信する
    #[tracing::instrument(
        skip_all,
        fields(
            event_id = %delivery.event_id,
            campaign_id = %delivery.campaign_id,
            subscriber_id = %delivery.subscriber_id,
        )
    )]
    pub async fn deliver(&self, delivery: &DeliveryMessage) -> HandleOutcome {
        let key = dedup_key(&delivery.event_id, &delivery.subscriber_id);
        match self.cache.set_if_absent(&key, self.dedup_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                log_business_event!(
                    event.category = event::category::EMAIL,
                    event.action = event::action::EMAIL_DUPLICATE,
                    event.result = event::result::SKIPPED,
                    "送信済みのため重複配信をスキップしました"
                );
                return HandleOutcome::Ack;
            }
            Err(e) => {
                tracing::error!(
                    error.category = event_log::error::category::INFRASTRUCTURE,
                    error.kind = event_log::error::kind::CACHE,
                    error = %e,
                    "重複排除キーを確認できません。再配信を待ちます"
                );
                return HandleOutcome::Retry;
            }
        }

        let outcome = self.provider.send(&outbound_email(delivery)).await;

        match outcome {
            ProviderOutcome::Success { message_id } => {
                let log = SendLog::successful(
                    delivery.event_id.clone(),
                    delivery.user_id.clone(),
                    delivery.subscriber_id.clone(),
                    delivery.campaign_id.clone(),
                    message_id.clone(),
                    self.clock.now(),
                );
                self.record(&log).await;

                log_business_event!(
                    event.category = event::category::EMAIL,
                    event.action = event::action::EMAIL_SENT,
                    event.result = event::result::SUCCESS,
                    provider_message_id = %message_id,
                    "メールを送信しました"
                );
                HandleOutcome::Ack
            }
            outcome if outcome.is_terminal() => {
                let log = SendLog::failed(
                    delivery.event_id.clone(),
                    delivery.user_id.clone(),
                    Some(delivery.subscriber_id.clone()),
                    delivery.campaign_id.clone(),
                    outcome.description(),
                    self.clock.now(),
                );
                self.record(&log).await;

                log_business_event!(
                    event.category = event::category::EMAIL,
                    event.action = event::action::EMAIL_FAILED,
                    event.result = event::result::FAILURE,
                    reason = outcome.description(),
                    "プロバイダが送信を拒否しました"
                );
                HandleOutcome::Ack
            }
            outcome => {
                // キーを残すと再配信が重複扱いになる
                if let Err(e) = self.cache.delete(&key).await {
                    tracing::error!(
                        error.category = event_log::error::category::INFRASTRUCTURE,
                        error.kind = event_log::error::kind::CACHE,
                        error = %e,
                        "重複排除キーを削除できません"
                    );
                }

                log_business_event!(
                    event.category = event::category::EMAIL,
                    event.action = event::action::EMAIL_DEFERRED,
                    event.result = event::result::FAILURE,
                    reason = outcome.description(),
                    "一時的な失敗のため再配信を待ちます"
                );
                HandleOutcome::Retry
            }
        }
    }

    async fn record(&self, log: &SendLog) {
        if let Err(e) = self.send_logs.insert(log).await {
            tracing::error!(
                error.category = event_log::error::category::INFRASTRUCTURE,
                error.kind = event_log::error::kind::DATABASE,
                error = %e,
                "送信ログの記録に失敗しました"
            );
        }
    }
}

fn outbound_email(delivery: &DeliveryMessage) -> OutboundEmail {
    OutboundEmail {
        to:                delivery.to.clone(),
        source:            delivery.source.clone(),
        subject:           delivery.subject_part.clone(),
        html_body:         delivery.html_part.clone(),
        text_body:         delivery.text_part.clone(),
        configuration_set: delivery
            .configuration_set_exists
            .then(|| delivery.user_uuid.to_string()),
        tags:              vec![
            (TAG_CAMPAIGN_ID.to_string(), delivery.campaign_id.to_string()),
            (TAG_USER_ID.to_string(), delivery.user_id.to_string()),
        ],
        provider_keys:     delivery.provider_keys.clone(),
    }
}

#[async_trait]
impl MessageHandler for Sender {
    async fn handle(&self, message: &ReceivedMessage) -> HandleOutcome {
        match serde_json::from_str::<DeliveryMessage>(&message.body) {
            Ok(delivery) => self.deliver(&delivery).await,
            Err(e) => {
                tracing::error!(
                    message_id = %message.message_id,
                    error.category = event_log::error::category::INPUT,
                    error.kind = event_log::error::kind::MALFORMED_MESSAGE,
                    error = %e,
                    "配信メッセージを解釈できないため破棄します"
                );
                HandleOutcome::Ack
            }
        }
    }
}
