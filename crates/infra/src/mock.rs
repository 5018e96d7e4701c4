//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリ実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! mailcast-infra = { workspace = true, features = ["test-utils"] }
//! ```
//!
//! リポジトリは PostgreSQL 実装と同じ契約（キーセット順序・セグメント重複排除・
//! ユーザースコープかつ遷移元状態を条件とする更新）を守る。キューは可視性タイムアウトと再配信を再現する。

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcast_domain::{
    campaign::{Campaign, CampaignId, CampaignSchedule, CampaignScheduleId, CampaignStatus, EventId},
    provider::{OutboundEmail, ProviderOutcome},
    segment::{Segment, SegmentId},
    send_log::SendLog,
    subscriber::{Subscriber, SubscriberCursor, SubscriberId, SubscriberPageRequest},
    template::{Template, TemplateId},
    user::{User, UserId},
};
use tokio::time::Instant;

use crate::{
    cache::DedupCache,
    error::InfraError,
    provider::EmailProvider,
    queue::{MessageQueue, ReceivedMessage},
    repository::{
        CampaignRepository,
        ProviderSettings,
        ScheduleRepository,
        SegmentRepository,
        SendLogRepository,
        SubscriberRepository,
        TemplateRepository,
        UserRepository,
    },
};

// ===== MockCampaignRepository =====

#[derive(Clone, Default)]
pub struct MockCampaignRepository {
    campaigns: Arc<Mutex<Vec<Campaign>>>,
}

impl MockCampaignRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_campaign(&self, campaign: Campaign) {
        self.campaigns.lock().unwrap().push(campaign);
    }

    pub fn all(&self) -> Vec<Campaign> {
        self.campaigns.lock().unwrap().clone()
    }

    pub fn get(&self, id: &CampaignId) -> Option<Campaign> {
        self.campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }
}

#[async_trait]
impl CampaignRepository for MockCampaignRepository {
    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<Campaign>, InfraError> {
        Ok(self.get(id))
    }

    async fn update_status(
        &self,
        campaign: &Campaign,
        expected_from: &[CampaignStatus],
    ) -> Result<bool, InfraError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        let stored = campaigns.iter_mut().find(|c| {
            c.id() == campaign.id()
                && c.user_id() == campaign.user_id()
                && expected_from.contains(&c.status())
        });
        match stored {
            Some(stored) => {
                *stored = campaign.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ===== MockScheduleRepository =====

#[derive(Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<Vec<CampaignSchedule>>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_schedule(&self, schedule: CampaignSchedule) {
        self.schedules.lock().unwrap().push(schedule);
    }

    pub fn all(&self) -> Vec<CampaignSchedule> {
        self.schedules.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<CampaignSchedule>, InfraError> {
        let mut due: Vec<CampaignSchedule> = self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| (a.scheduled_at, &a.id).cmp(&(b.scheduled_at, &b.id)));
        Ok(due)
    }

    async fn delete(&self, id: &CampaignScheduleId) -> Result<(), InfraError> {
        self.schedules.lock().unwrap().retain(|s| &s.id != id);
        Ok(())
    }
}

// ===== MockSegmentRepository =====

#[derive(Clone, Default)]
pub struct MockSegmentRepository {
    segments: Arc<Mutex<Vec<Segment>>>,
}

impl MockSegmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_segment(&self, segment: Segment) {
        self.segments.lock().unwrap().push(segment);
    }
}

#[async_trait]
impl SegmentRepository for MockSegmentRepository {
    async fn find_by_ids(
        &self,
        user_id: &UserId,
        ids: &[SegmentId],
    ) -> Result<Vec<Segment>, InfraError> {
        Ok(self
            .segments
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.user_id == user_id && ids.contains(&s.id))
            .cloned()
            .collect())
    }
}

// ===== MockTemplateRepository =====

#[derive(Clone, Default)]
pub struct MockTemplateRepository {
    templates: Arc<Mutex<Vec<Template>>>,
}

impl MockTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&self, template: Template) {
        self.templates.lock().unwrap().push(template);
    }
}

#[async_trait]
impl TemplateRepository for MockTemplateRepository {
    async fn find_by_id(
        &self,
        id: &TemplateId,
        user_id: &UserId,
    ) -> Result<Option<Template>, InfraError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| &t.id == id && &t.user_id == user_id)
            .cloned())
    }
}

// ===== MockSubscriberRepository =====

#[derive(Default)]
struct SubscriberStore {
    subscribers: Vec<Subscriber>,
    memberships: Vec<(SegmentId, SubscriberId)>,
    calls:       usize,
    fail_from:   Option<usize>,
}

/// キーセットページングの契約をメモリ上で再現する購読者リポジトリ
#[derive(Clone, Default)]
pub struct MockSubscriberRepository {
    store: Arc<Mutex<SubscriberStore>>,
}

impl MockSubscriberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 購読者を追加し、指定セグメントに所属させる
    pub fn add_subscriber(&self, subscriber: Subscriber, segment_ids: &[SegmentId]) {
        let mut store = self.store.lock().unwrap();
        for segment_id in segment_ids {
            store
                .memberships
                .push((segment_id.clone(), subscriber.id.clone()));
        }
        store.subscribers.push(subscriber);
    }

    pub fn remove_subscriber(&self, id: &SubscriberId) {
        let mut store = self.store.lock().unwrap();
        store.subscribers.retain(|s| &s.id != id);
        store.memberships.retain(|(_, subscriber_id)| subscriber_id != id);
    }

    /// `call` 回目（0 始まり）以降の `find_page` をエラーにする
    pub fn fail_from_call(&self, call: usize) {
        self.store.lock().unwrap().fail_from = Some(call);
    }

    /// これまでの `find_page` 呼び出し回数
    pub fn calls(&self) -> usize {
        self.store.lock().unwrap().calls
    }
}

#[async_trait]
impl SubscriberRepository for MockSubscriberRepository {
    async fn find_page(
        &self,
        request: &SubscriberPageRequest,
    ) -> Result<Vec<Subscriber>, InfraError> {
        let mut store = self.store.lock().unwrap();
        let call = store.calls;
        store.calls += 1;
        if store.fail_from.is_some_and(|from| call >= from) {
            return Err(InfraError::unexpected("購読者の取得に失敗（モック）"));
        }

        let filter = &request.filter;
        let in_segments = |subscriber: &Subscriber| {
            store.memberships.iter().any(|(segment_id, subscriber_id)| {
                subscriber_id == &subscriber.id && filter.segment_ids.contains(segment_id)
            })
        };
        let after = |subscriber: &Subscriber| {
            request
                .after
                .as_ref()
                .is_none_or(|cursor: &SubscriberCursor| cursor.precedes(subscriber))
        };

        let mut page: Vec<Subscriber> = store
            .subscribers
            .iter()
            .filter(|s| filter.accepts(s) && in_segments(s) && after(s))
            .cloned()
            .collect();
        page.sort_by(|a, b| (a.created_at, a.id.as_uuid()).cmp(&(b.created_at, b.id.as_uuid())));
        page.truncate(request.limit as usize);

        Ok(page)
    }
}

// ===== MockSendLogRepository =====

#[derive(Clone, Default)]
pub struct MockSendLogRepository {
    logs: Arc<Mutex<Vec<SendLog>>>,
}

impl MockSendLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<SendLog> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SendLogRepository for MockSendLogRepository {
    async fn insert(&self, log: &SendLog) -> Result<(), InfraError> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn find_by_event(&self, event_id: &EventId) -> Result<Vec<SendLog>, InfraError> {
        let mut logs: Vec<SendLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| &l.event_id == event_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(logs)
    }
}

// ===== MockUserRepository =====

#[derive(Clone, Default)]
pub struct MockUserRepository {
    users:    Arc<Mutex<Vec<User>>>,
    settings: Arc<Mutex<HashMap<UserId, ProviderSettings>>>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーを追加する。`settings` が `None` なら送信設定は未登録
    pub fn add_user(&self, user: User, settings: Option<ProviderSettings>) {
        if let Some(settings) = settings {
            self.settings.lock().unwrap().insert(user.id.clone(), settings);
        }
        self.users.lock().unwrap().push(user);
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, InfraError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| &u.id == id)
            .cloned())
    }

    async fn find_provider_settings(
        &self,
        id: &UserId,
    ) -> Result<Option<ProviderSettings>, InfraError> {
        Ok(self.settings.lock().unwrap().get(id).cloned())
    }
}

// ===== InMemoryMessageQueue =====

struct QueuedMessage {
    message_id:       String,
    body:             String,
    receipt_handle:   Option<String>,
    invisible_until:  Option<Instant>,
    receive_count:    u32,
}

#[derive(Default)]
struct QueueState {
    messages:          Vec<QueuedMessage>,
    published:         Vec<String>,
    deleted:           Vec<String>,
    extensions:        Vec<Duration>,
    fail_publish:      bool,
    failing_publishes: usize,
}

/// 可視性タイムアウトと再配信を再現するインメモリキュー
///
/// - 受信したメッセージは `visibility_timeout` の間は再受信されない
/// - 受信のたびに新しい receipt handle を発行し、古いハンドルでの操作はエラーになる
/// - [`expire_visibility`](Self::expire_visibility) でタイムアウト経過を即座に再現できる
#[derive(Clone)]
pub struct InMemoryMessageQueue {
    state:              Arc<Mutex<QueueState>>,
    visibility_timeout: Duration,
    sequence:           Arc<AtomicU64>,
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_visibility_timeout(Duration::from_secs(30))
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            visibility_timeout,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.sequence.fetch_add(1, Ordering::Relaxed))
    }

    /// これまでに投入された本文（削除済みを含む）
    pub fn published(&self) -> Vec<String> {
        self.state.lock().unwrap().published.clone()
    }

    /// 削除されていないメッセージの本文（処理中を含む）
    pub fn remaining(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    /// 削除（ack）されたメッセージ ID
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// 可視性タイムアウトの延長履歴
    pub fn extensions(&self) -> Vec<Duration> {
        self.state.lock().unwrap().extensions.clone()
    }

    /// 処理中のメッセージをすべて即座に再受信可能にする
    pub fn expire_visibility(&self) {
        for message in &mut self.state.lock().unwrap().messages {
            message.invisible_until = None;
        }
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().unwrap().fail_publish = fail;
    }

    /// 次の `count` 回の投入だけを失敗させる
    pub fn fail_next_publishes(&self, count: usize) {
        self.state.lock().unwrap().failing_publishes = count;
    }

    fn take_visible(&self, max_messages: usize) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        let mut received = Vec::new();
        let mut state = self.state.lock().unwrap();

        for message in state.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if message.invisible_until.is_some_and(|until| until > now) {
                continue;
            }
            let receipt_handle = self.next_id("receipt");
            message.receipt_handle = Some(receipt_handle.clone());
            message.invisible_until = Some(now + self.visibility_timeout);
            message.receive_count += 1;
            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle,
                body: message.body.clone(),
            });
        }

        received
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, body: &str) -> Result<String, InfraError> {
        let message_id = self.next_id("msg");
        let mut state = self.state.lock().unwrap();
        if state.fail_publish {
            return Err(InfraError::queue("キューへの投入に失敗（モック）"));
        }
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(InfraError::queue("キューへの投入に失敗（モック）"));
        }
        state.published.push(body.to_string());
        state.messages.push(QueuedMessage {
            message_id: message_id.clone(),
            body: body.to_string(),
            receipt_handle: None,
            invisible_until: None,
            receive_count: 0,
        });
        Ok(message_id)
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, InfraError> {
        let deadline = Instant::now() + wait;
        loop {
            let received = self.take_visible(max_messages.max(1));
            if !received.is_empty() || Instant::now() >= deadline {
                return Ok(received);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), InfraError> {
        let mut state = self.state.lock().unwrap();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| InfraError::queue("receipt handle が無効です"))?;
        message.invisible_until = Some(Instant::now() + timeout);
        state.extensions.push(timeout);
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), InfraError> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| InfraError::queue("receipt handle が無効です"))?;
        let message = state.messages.remove(index);
        state.deleted.push(message.message_id);
        Ok(())
    }
}

// ===== MockDedupCache =====

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Duration>,
    fail:    bool,
}

/// 原子的な set-if-absent を持つインメモリキャッシュ（TTL は記録のみ）
#[derive(Clone, Default)]
pub struct MockDedupCache {
    state: Arc<Mutex<CacheState>>,
}

impl MockDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().unwrap().entries.contains_key(key)
    }

    /// キーに設定された TTL
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.state.lock().unwrap().entries.get(key).copied()
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }
}

#[async_trait]
impl DedupCache for MockDedupCache {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, InfraError> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Err(InfraError::unexpected("キャッシュに接続できません（モック）"));
        }
        if state.entries.contains_key(key) {
            return Ok(false);
        }
        state.entries.insert(key.to_string(), ttl);
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, InfraError> {
        Ok(self.contains(key))
    }

    async fn delete(&self, key: &str) -> Result<(), InfraError> {
        self.state.lock().unwrap().entries.remove(key);
        Ok(())
    }
}

// ===== MockEmailProvider =====

#[derive(Default)]
struct ProviderState {
    sent:         Vec<OutboundEmail>,
    scripted:     VecDeque<ProviderOutcome>,
    by_recipient: HashMap<String, ProviderOutcome>,
}

/// 結果を台本で指定できる送信プロバイダ
///
/// 優先順位: 宛先ごとの結果 > 台本（先頭から消費）> 成功。
/// すべての送信要求を記録する（結果に関わらず）。
#[derive(Clone, Default)]
pub struct MockEmailProvider {
    state:    Arc<Mutex<ProviderState>>,
    sequence: Arc<AtomicU64>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の送信の結果を台本に追加する
    pub fn push_outcome(&self, outcome: ProviderOutcome) {
        self.state.lock().unwrap().scripted.push_back(outcome);
    }

    /// 特定の宛先への送信結果を固定する
    pub fn set_outcome_for(&self, to: impl Into<String>, outcome: ProviderOutcome) {
        self.state
            .lock()
            .unwrap()
            .by_recipient
            .insert(to.into(), outcome);
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &OutboundEmail) -> ProviderOutcome {
        let mut state = self.state.lock().unwrap();
        state.sent.push(email.clone());

        if let Some(outcome) = state.by_recipient.get(&email.to) {
            return outcome.clone();
        }
        state
            .scripted
            .pop_front()
            .unwrap_or_else(|| ProviderOutcome::Success {
                message_id: format!("mock-{}", self.sequence.fetch_add(1, Ordering::Relaxed)),
            })
    }
}
