//! # 送信ログ
//!
//! 配信試行の結果を記録する追記専用のログ。
//!
//! - 1 行 = 1 回の「確定した」試行結果（成功 or 終端失敗）。再試行可能な失敗は記録しない
//! - ID は UUID v7。並行する書き込み同士でも衝突せず、生成順にソートできる
//! - 書き込むのは配信段（Sender）とファンアウト段（Campaigner）のみ。更新・削除はしない

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    campaign::{CampaignId, EventId},
    subscriber::SubscriberId,
    user::UserId,
};

define_uuid_id! {
    /// 送信ログ ID
    pub struct SendLogId;
}

/// 失敗理由の説明文
pub mod description {
    pub const SENT: &str = "メールを送信しました";
    pub const REJECTED: &str = "プロバイダがメッセージを拒否しました";
    pub const UNVERIFIED: &str = "送信元ドメインが検証されていません";
    pub const CONFIG_MISSING: &str = "構成セットなどの送信設定が見つかりません";
    pub const TEMPLATE_PARSE_FAILED: &str = "テンプレートの解析に失敗しました";
    pub const RENDER_FAILED: &str = "テンプレートのレンダリングに失敗しました";
    pub const PUBLISH_FAILED: &str = "配信メッセージのキュー投入に失敗しました";
    pub const PAGINATION_FAILED: &str = "購読者の取得に失敗しました";
}

/// 送信結果
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SendStatus {
    Successful,
    Failed,
}

/// 送信ログ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendLog {
    pub id:            SendLogId,
    pub event_id:      EventId,
    pub user_id:       UserId,
    /// キャンペーン単位の失敗では `None`
    pub subscriber_id: Option<SubscriberId>,
    pub campaign_id:   CampaignId,
    pub status:        SendStatus,
    pub description:   String,
    /// プロバイダが採番したメッセージ ID（成功時のみ）
    pub message_id:    Option<String>,
    pub created_at:    DateTime<Utc>,
}

impl SendLog {
    /// 送信成功の行
    pub fn successful(
        event_id: EventId,
        user_id: UserId,
        subscriber_id: SubscriberId,
        campaign_id: CampaignId,
        message_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SendLogId::new(),
            event_id,
            user_id,
            subscriber_id: Some(subscriber_id),
            campaign_id,
            status: SendStatus::Successful,
            description: description::SENT.to_string(),
            message_id: Some(message_id),
            created_at: now,
        }
    }

    /// 送信失敗の行
    pub fn failed(
        event_id: EventId,
        user_id: UserId,
        subscriber_id: Option<SubscriberId>,
        campaign_id: CampaignId,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SendLogId::new(),
            event_id,
            user_id,
            subscriber_id,
            campaign_id,
            status: SendStatus::Failed,
            description: description.into(),
            message_id: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn successfulはメッセージidを持つ() {
        let log = SendLog::successful(
            EventId::new(),
            UserId::new(),
            SubscriberId::new(),
            CampaignId::new(),
            "msg-1".to_string(),
            Utc::now(),
        );

        assert_eq!(log.status, SendStatus::Successful);
        assert_eq!(log.message_id.as_deref(), Some("msg-1"));
        assert!(log.subscriber_id.is_some());
    }

    #[test]
    fn キャンペーン単位の失敗は購読者を持たない() {
        let log = SendLog::failed(
            EventId::new(),
            UserId::new(),
            None,
            CampaignId::new(),
            description::TEMPLATE_PARSE_FAILED,
            Utc::now(),
        );

        assert_eq!(log.status, SendStatus::Failed);
        assert!(log.subscriber_id.is_none());
        assert!(log.message_id.is_none());
    }

    #[test]
    fn 連続して作成したログのidは単調増加する() {
        let now = Utc::now();
        let ids: Vec<SendLogId> = (0..50)
            .map(|_| {
                SendLog::failed(
                    EventId::new(),
                    UserId::new(),
                    None,
                    CampaignId::new(),
                    "x",
                    now,
                )
                .id
            })
            .collect();

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn send_statusの文字列変換() {
        assert_eq!(SendStatus::Successful.to_string(), "successful");
        assert_eq!(SendStatus::from_str("failed").unwrap(), SendStatus::Failed);
        assert_eq!(
            SendStatus::from_str("bounced"),
            Err(strum::ParseError::VariantNotFound)
        );
    }
}
