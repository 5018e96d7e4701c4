//! # キューメッセージ
//!
//! パイプラインの段間でやり取りする JSON ペイロード。
//!
//! ```text
//! Scheduler ──DispatchMessage──▶ Campaigner ──DeliveryMessage──▶ Sender
//!              (1 件/キャンペーン)             (1 件/購読者)
//! ```
//!
//! どちらも at-least-once で配送されるため、受信側は重複を前提に処理する。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    campaign::{CampaignId, EventId},
    segment::SegmentId,
    subscriber::{Subscriber, SubscriberId},
    template::{RenderedParts, TemplateData},
    user::{ProviderKeys, UserId},
};

/// ディスパッチメッセージ（「このキャンペーンの配信を開始せよ」）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub event_id:                 EventId,
    pub campaign_id:              CampaignId,
    pub segment_ids:              Vec<SegmentId>,
    /// テンプレート変数のデフォルト値
    pub template_data:            TemplateData,
    /// `From` ヘッダー形式の送信元
    pub source:                   String,
    pub user_id:                  UserId,
    pub user_uuid:                Uuid,
    pub configuration_set_exists: bool,
    pub provider_keys:            ProviderKeys,
}

impl DispatchMessage {
    /// 購読者 1 人分の配信メッセージを組み立てる
    pub fn delivery_for(&self, subscriber: &Subscriber, parts: RenderedParts) -> DeliveryMessage {
        DeliveryMessage {
            event_id:                 self.event_id.clone(),
            subscriber_id:            subscriber.id.clone(),
            campaign_id:              self.campaign_id.clone(),
            html_part:                parts.html,
            subject_part:             parts.subject,
            text_part:                parts.text,
            user_id:                  self.user_id.clone(),
            user_uuid:                self.user_uuid,
            provider_keys:            self.provider_keys.clone(),
            to:                       subscriber.email.clone(),
            source:                   self.source.clone(),
            configuration_set_exists: self.configuration_set_exists,
        }
    }
}

/// 配信メッセージ（「この購読者にこのキャンペーンを送れ」）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMessage {
    pub event_id:                 EventId,
    pub subscriber_id:            SubscriberId,
    pub campaign_id:              CampaignId,
    pub html_part:                String,
    pub subject_part:             String,
    pub text_part:                String,
    pub user_id:                  UserId,
    pub user_uuid:                Uuid,
    pub provider_keys:            ProviderKeys,
    /// 宛先メールアドレス
    pub to:                       String,
    pub source:                   String,
    #[serde(default)]
    pub configuration_set_exists: bool,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn make_dispatch() -> DispatchMessage {
        DispatchMessage {
            event_id:                 EventId::new(),
            campaign_id:              CampaignId::new(),
            segment_ids:              vec![SegmentId::new()],
            template_data:            HashMap::new(),
            source:                   "Shop <news@example.com>".to_string(),
            user_id:                  UserId::new(),
            user_uuid:                Uuid::now_v7(),
            configuration_set_exists: true,
            provider_keys:            ProviderKeys {
                access_key_id:     "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                region:            "us-east-1".to_string(),
            },
        }
    }

    #[test]
    fn delivery_forはディスパッチの文脈と購読者を引き継ぐ() {
        let dispatch = make_dispatch();
        let subscriber = Subscriber {
            id:          SubscriberId::new(),
            user_id:     dispatch.user_id.clone(),
            email:       "hanako@example.com".to_string(),
            name:        "花子".to_string(),
            metadata:    HashMap::new(),
            active:      true,
            blacklisted: false,
            created_at:  Utc::now(),
        };
        let parts = RenderedParts {
            subject: "件名".to_string(),
            html:    "<p>本文</p>".to_string(),
            text:    "本文".to_string(),
        };

        let delivery = dispatch.delivery_for(&subscriber, parts);

        assert_eq!(delivery.event_id, dispatch.event_id);
        assert_eq!(delivery.subscriber_id, subscriber.id);
        assert_eq!(delivery.to, "hanako@example.com");
        assert_eq!(delivery.source, dispatch.source);
        assert_eq!(delivery.subject_part, "件名");
        assert_eq!(delivery.html_part, "<p>本文</p>");
        assert!(delivery.configuration_set_exists);
    }

    #[test]
    fn 配信メッセージのidは素のuuid文字列でシリアライズされる() {
        let dispatch = make_dispatch();

        let value = serde_json::to_value(&dispatch).unwrap();

        assert_eq!(
            value["event_id"],
            json!(dispatch.event_id.as_uuid().to_string())
        );
        assert_eq!(value["segment_ids"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn configuration_set_existsが欠けた配信メッセージはfalseとして読む() {
        let value = json!({
            "event_id": Uuid::now_v7(),
            "subscriber_id": Uuid::now_v7(),
            "campaign_id": Uuid::now_v7(),
            "html_part": "<p>x</p>",
            "subject_part": "x",
            "text_part": "x",
            "user_id": Uuid::now_v7(),
            "user_uuid": Uuid::now_v7(),
            "provider_keys": {
                "access_key_id": "AKIA",
                "secret_access_key": "secret",
                "region": "us-east-1"
            },
            "to": "a@example.com",
            "source": "news@example.com"
        });

        let message: DeliveryMessage = serde_json::from_value(value).unwrap();

        assert!(!message.configuration_set_exists);
    }
}
