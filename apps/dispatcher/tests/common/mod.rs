//! パイプラインテスト共通ヘルパー
//!
//! 3 ステージをインメモリ実装でつなぎ、キューを手動で排出して
//! パイプライン全体を決定的に進める。

#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mailcast_dispatcher::{
    usecase::{Campaigner, CampaignerSettings, Scheduler, Sender},
    worker::{HandleOutcome, MessageHandler},
};
use mailcast_domain::{
    campaign::{Campaign, CampaignId, CampaignSchedule, CampaignScheduleId, SenderIdentity},
    clock::FixedClock,
    segment::{Segment, SegmentId},
    subscriber::{Subscriber, SubscriberId},
    template::{Template, TemplateData, TemplateId},
    user::{ProviderKeys, User, UserId},
};
use mailcast_infra::{
    cache::DEFAULT_DEDUP_TTL,
    mock::{
        InMemoryMessageQueue,
        MockCampaignRepository,
        MockDedupCache,
        MockEmailProvider,
        MockScheduleRepository,
        MockSegmentRepository,
        MockSendLogRepository,
        MockSubscriberRepository,
        MockTemplateRepository,
        MockUserRepository,
    },
    queue::MessageQueue,
    repository::ProviderSettings,
    template::TeraTemplateRenderer,
};

pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// テンプレートの 3 パート
pub struct TemplateParts<'a> {
    pub subject: &'a str,
    pub html:    &'a str,
    pub text:    &'a str,
}

impl Default for TemplateParts<'_> {
    fn default() -> Self {
        Self {
            subject: "{{ first_name }} さんへ {{ season }}のお知らせ",
            html:    "<p>{{ first_name }} さん</p>",
            text:    "{{ first_name }} さん",
        }
    }
}

/// インメモリ実装でつないだパイプライン
pub struct Pipeline {
    pub schedules:   MockScheduleRepository,
    pub campaigns:   MockCampaignRepository,
    pub templates:   MockTemplateRepository,
    pub segments:    MockSegmentRepository,
    pub subscribers: MockSubscriberRepository,
    pub send_logs:   MockSendLogRepository,
    pub users:       MockUserRepository,
    pub cache:       MockDedupCache,
    pub provider:    MockEmailProvider,
    pub dispatch_q:  InMemoryMessageQueue,
    pub delivery_q:  InMemoryMessageQueue,
    pub user:        User,
    pub scheduler:   Scheduler,
    pub campaigner:  Arc<Campaigner>,
    pub sender:      Arc<Sender>,
    subscriber_seq:  i64,
}

impl Pipeline {
    pub fn new() -> Self {
        let schedules = MockScheduleRepository::new();
        let campaigns = MockCampaignRepository::new();
        let templates = MockTemplateRepository::new();
        let segments = MockSegmentRepository::new();
        let subscribers = MockSubscriberRepository::new();
        let send_logs = MockSendLogRepository::new();
        let users = MockUserRepository::new();
        let cache = MockDedupCache::new();
        let provider = MockEmailProvider::new();
        let dispatch_q = InMemoryMessageQueue::new();
        let delivery_q = InMemoryMessageQueue::new();
        let clock = Arc::new(FixedClock::new(test_now()));

        let user = User {
            id:    UserId::new(),
            uuid:  uuid::Uuid::now_v7(),
            email: "owner@example.com".to_string(),
            name:  "Owner".to_string(),
        };
        users.add_user(
            user.clone(),
            Some(ProviderSettings {
                keys:                     ProviderKeys {
                    access_key_id:     "AKIATEST".to_string(),
                    secret_access_key: "secret".to_string(),
                    region:            "ap-northeast-1".to_string(),
                },
                configuration_set_exists: true,
            }),
        );

        let scheduler = Scheduler::new(
            Arc::new(schedules.clone()),
            Arc::new(campaigns.clone()),
            Arc::new(templates.clone()),
            Arc::new(segments.clone()),
            Arc::new(users.clone()),
            Arc::new(dispatch_q.clone()),
            clock.clone(),
        );
        let campaigner = Arc::new(Campaigner::new(
            Arc::new(campaigns.clone()),
            Arc::new(templates.clone()),
            Arc::new(subscribers.clone()),
            Arc::new(send_logs.clone()),
            Arc::new(TeraTemplateRenderer::new()),
            Arc::new(dispatch_q.clone()),
            Arc::new(delivery_q.clone()),
            clock.clone(),
            CampaignerSettings {
                page_size: 2,
                ..CampaignerSettings::default()
            },
        ));
        let sender = Arc::new(Sender::new(
            Arc::new(cache.clone()),
            Arc::new(provider.clone()),
            Arc::new(send_logs.clone()),
            clock,
            DEFAULT_DEDUP_TTL,
        ));

        Self {
            schedules,
            campaigns,
            templates,
            segments,
            subscribers,
            send_logs,
            users,
            cache,
            provider,
            dispatch_q,
            delivery_q,
            user,
            scheduler,
            campaigner,
            sender,
            subscriber_seq: 0,
        }
    }

    pub fn add_segment(&self, name: &str) -> SegmentId {
        let segment = Segment {
            id:      SegmentId::new(),
            user_id: self.user.id.clone(),
            name:    name.to_string(),
        };
        let id = segment.id.clone();
        self.segments.add_segment(segment);
        id
    }

    /// 購読者を追加する。作成日時は追加順に 1 秒ずつ進む
    pub fn add_subscriber(
        &mut self,
        email: &str,
        segment_ids: &[SegmentId],
        metadata: HashMap<String, String>,
    ) -> SubscriberId {
        self.subscriber_seq += 1;
        let subscriber = Subscriber {
            id: SubscriberId::new(),
            user_id: self.user.id.clone(),
            email: email.to_string(),
            name: String::new(),
            metadata,
            active: true,
            blacklisted: false,
            created_at: test_now() - ChronoDuration::hours(1)
                + ChronoDuration::seconds(self.subscriber_seq),
        };
        let id = subscriber.id.clone();
        self.subscribers.add_subscriber(subscriber, segment_ids);
        id
    }

    /// scheduled 状態のキャンペーンと期限到来済みのスケジュールを登録する
    pub fn schedule_campaign(
        &self,
        parts: TemplateParts<'_>,
        segment_ids: &[SegmentId],
        template_data: TemplateData,
    ) -> CampaignId {
        let template = Template {
            id:           TemplateId::new(),
            user_id:      self.user.id.clone(),
            name:         "newsletter".to_string(),
            subject_part: parts.subject.to_string(),
            html_part:    parts.html.to_string(),
            text_part:    parts.text.to_string(),
        };
        let campaign = Campaign::new(
            CampaignId::new(),
            self.user.id.clone(),
            template.id.clone(),
            "秋のキャンペーン",
        )
        .schedule()
        .unwrap();
        let campaign_id = campaign.id().clone();

        self.schedules.add_schedule(CampaignSchedule {
            id: CampaignScheduleId::new(),
            campaign_id: campaign_id.clone(),
            user_id: self.user.id.clone(),
            scheduled_at: test_now() - ChronoDuration::minutes(1),
            segment_ids: segment_ids.to_vec(),
            template_data,
            sender: SenderIdentity {
                address: "news@example.com".to_string(),
                name:    "Example News".to_string(),
            },
        });
        self.templates.add_template(template);
        self.campaigns.add_campaign(campaign);
        campaign_id
    }

    /// スケジューラを 1 tick 進め、両キューが空になるまで処理する
    pub async fn run_to_completion(&self) {
        self.scheduler.tick().await.unwrap();
        drain(&self.dispatch_q, self.campaigner.as_ref()).await;
        drain(&self.delivery_q, self.sender.as_ref()).await;
    }
}

/// 受信できるメッセージがなくなるまでハンドラで処理する
///
/// Ack は削除し、Retry は可視性タイムアウトまで残す（ワーカーと同じ扱い）。
pub async fn drain(queue: &InMemoryMessageQueue, handler: &dyn MessageHandler) -> Vec<HandleOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let messages = queue.receive(10, Duration::ZERO).await.unwrap();
        if messages.is_empty() {
            return outcomes;
        }
        for message in messages {
            let outcome = handler.handle(&message).await;
            if outcome == HandleOutcome::Ack {
                queue.delete(&message.receipt_handle).await.unwrap();
            }
            outcomes.push(outcome);
        }
    }
}
