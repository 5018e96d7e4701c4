//! # キャンペーナー（ファンアウト）
//!
//! ディスパッチメッセージ 1 通を、購読者ごとの配信メッセージに展開する。
//!
//! ## 状態遷移
//!
//! ```text
//! scheduled ─┐
//!            ├─▶ sending ─▶ sent     （走査が最後まで終わった）
//! sending ───┘      │
//!                   └─────▶ failed   （テンプレート解析失敗 / 走査中のエラー）
//! ```
//!
//! `sent` / `failed` のキャンペーンに対するディスパッチメッセージは重複として捨てる。
//!
//! ## 失敗の扱い
//!
//! | 失敗 | 単位 | 結果 |
//! |------|------|------|
//! | テンプレートがない・解析できない | キャンペーン | `failed`、再試行しない |
//! | 購読者の走査エラー | キャンペーン | `failed` |
//! | レンダリング・配信メッセージ投入の失敗 | 購読者 | 送信ログに記録して続行 |
//! | 走査開始前のストレージエラー | メッセージ | 再配信を待つ |

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use mailcast_domain::{
    campaign::{Campaign, CampaignStatus},
    clock::Clock,
    message::DispatchMessage,
    send_log::{SendLog, description},
    subscriber::{Subscriber, SubscriberFilter},
    template::merge_variables,
};
use mailcast_infra::{
    SubscriberPager,
    queue::{MessageQueue, ReceivedMessage},
    repository::{
        CampaignRepository,
        SendLogRepository,
        SubscriberRepository,
        TemplateRepository,
    },
    template::{CompiledTemplate, TemplateRenderer},
};
use mailcast_shared::{
    event_log::{self, event},
    log_business_event,
};
use tokio::time::Instant;

use crate::{
    error::DispatchError,
    worker::{HandleOutcome, MessageHandler},
};

/// キャンペーナーの調整値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignerSettings {
    /// 購読者のページサイズ
    pub page_size:            u32,
    /// 延長時に設定し直す可視性タイムアウト
    pub visibility_extension: Duration,
    /// 最初のページの前に延長し、以降は前回からこの時間が経っていれば次のページの前に延長する
    pub extend_interval:      Duration,
}

impl Default for CampaignerSettings {
    fn default() -> Self {
        Self {
            page_size:            1000,
            visibility_extension: Duration::from_secs(300),
            extend_interval:      Duration::from_secs(150),
        }
    }
}

/// ファンアウトの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FanOutReport {
    published: u64,
    failed:    u64,
}

/// キャンペーナー
pub struct Campaigner {
    campaigns:      Arc<dyn CampaignRepository>,
    templates:      Arc<dyn TemplateRepository>,
    subscribers:    Arc<dyn SubscriberRepository>,
    send_logs:      Arc<dyn SendLogRepository>,
    renderer:       Arc<dyn TemplateRenderer>,
    dispatch_queue: Arc<dyn MessageQueue>,
    delivery_queue: Arc<dyn MessageQueue>,
    clock:          Arc<dyn Clock>,
    settings:       CampaignerSettings,
}

impl Campaigner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        templates: Arc<dyn TemplateRepository>,
        subscribers: Arc<dyn SubscriberRepository>,
        send_logs: Arc<dyn SendLogRepository>,
        renderer: Arc<dyn TemplateRenderer>,
        dispatch_queue: Arc<dyn MessageQueue>,
        delivery_queue: Arc<dyn MessageQueue>,
        clock: Arc<dyn Clock>,
        settings: CampaignerSettings,
    ) -> Self {
        Self {
            campaigns,
            templates,
            subscribers,
            send_logs,
            renderer,
            dispatch_queue,
            delivery_queue,
            clock,
            settings,
        }
    }

    /// ディスパッチメッセージを処理する
    ///
    /// `receipt_handle` は可視性タイムアウトの延長に使う。
    #[tracing::instrument(
        skip_all,
        fields(
            campaign_id = %dispatch.campaign_id,
            user_id = %dispatch.user_id,
            event_id = %dispatch.event_id,
        )
    )]
    pub async fn fan_out(
        &self,
        dispatch: &DispatchMessage,
        receipt_handle: &str,
    ) -> Result<HandleOutcome, DispatchError> {
        let Some(campaign) = self.campaigns.find_by_id(&dispatch.campaign_id).await? else {
            tracing::warn!("キャンペーンが見つからないためメッセージを破棄します");
            return Ok(HandleOutcome::Ack);
        };
        if campaign.user_id() != &dispatch.user_id {
            tracing::warn!("キャンペーンの所有者が一致しないためメッセージを破棄します");
            return Ok(HandleOutcome::Ack);
        }

        let campaign = match campaign.status() {
            CampaignStatus::Sending => campaign,
            CampaignStatus::Scheduled => {
                let sending = campaign.start_sending()?;
                let written = self
                    .campaigns
                    .update_status(&sending, &[CampaignStatus::Scheduled, CampaignStatus::Sending])
                    .await?;
                if !written {
                    tracing::info!("キャンペーンが並行して終了したためメッセージを破棄します");
                    return Ok(HandleOutcome::Ack);
                }
                sending
            }
            status => {
                tracing::info!(%status, "処理済みまたは未予約のキャンペーンのためメッセージを破棄します");
                return Ok(HandleOutcome::Ack);
            }
        };

        let template = self
            .templates
            .find_by_id(campaign.template_id(), &dispatch.user_id)
            .await?;
        let compiled = match template.map(|t| self.renderer.compile(&t)) {
            Some(Ok(compiled)) => compiled,
            Some(Err(e)) => {
                tracing::error!(
                    error.category = event_log::error::category::INPUT,
                    error.kind = event_log::error::kind::TEMPLATE,
                    error = %e,
                    "テンプレートの解析に失敗しました"
                );
                return self.fail(campaign, dispatch, description::TEMPLATE_PARSE_FAILED).await;
            }
            None => {
                tracing::error!(
                    template_id = %campaign.template_id(),
                    "テンプレートが見つかりません"
                );
                return self.fail(campaign, dispatch, description::TEMPLATE_PARSE_FAILED).await;
            }
        };

        // 走査上限は開始時刻で固定する
        let filter = SubscriberFilter::deliverable(
            dispatch.user_id.clone(),
            dispatch.segment_ids.clone(),
            self.clock.now(),
        );
        let mut pager = SubscriberPager::new(self.subscribers.as_ref(), filter, self.settings.page_size);
        let mut report = FanOutReport::default();
        // 最初のページの前に必ず延長し、キューの可視性タイムアウトに依存しない
        let mut last_extended: Option<Instant> = None;

        loop {
            if last_extended.is_none_or(|at| at.elapsed() >= self.settings.extend_interval) {
                self.extend_visibility(receipt_handle).await;
                last_extended = Some(Instant::now());
            }

            let page = match pager.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(
                        error.category = event_log::error::category::INFRASTRUCTURE,
                        error.kind = event_log::error::kind::DATABASE,
                        fetched = pager.fetched(),
                        error = %e,
                        "購読者の走査に失敗しました"
                    );
                    return self.fail(campaign, dispatch, description::PAGINATION_FAILED).await;
                }
            };

            for subscriber in &page {
                if self.fan_out_one(dispatch, compiled.as_ref(), subscriber).await {
                    report.published += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        let sent = campaign.complete(self.clock.now())?;
        let written = self
            .campaigns
            .update_status(&sent, &[CampaignStatus::Sending])
            .await?;
        if !written {
            tracing::warn!(
                published = report.published,
                "キャンペーンは並行して終了済みのため sent に更新しません"
            );
            return Ok(HandleOutcome::Ack);
        }

        log_business_event!(
            event.category = event::category::CAMPAIGN,
            event.action = event::action::CAMPAIGN_SENT,
            event.result = event::result::SUCCESS,
            published = report.published,
            failed = report.failed,
            "キャンペーンのファンアウトが完了しました"
        );

        Ok(HandleOutcome::Ack)
    }

    /// 1 購読者分の配信メッセージを投入する。失敗は送信ログに記録し `false` を返す
    async fn fan_out_one(
        &self,
        dispatch: &DispatchMessage,
        compiled: &dyn CompiledTemplate,
        subscriber: &Subscriber,
    ) -> bool {
        let data = merge_variables(&dispatch.template_data, &subscriber.metadata);
        let parts = match compiled.render(&data) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(
                    subscriber_id = %subscriber.id,
                    error.category = event_log::error::category::INPUT,
                    error.kind = event_log::error::kind::TEMPLATE,
                    error = %e,
                    "購読者のテンプレートをレンダリングできません"
                );
                self.record_subscriber_failure(dispatch, subscriber, description::RENDER_FAILED)
                    .await;
                return false;
            }
        };

        let delivery = dispatch.delivery_for(subscriber, parts);
        let published = match serde_json::to_string(&delivery) {
            Ok(body) => self.delivery_queue.publish(&body).await.map_err(DispatchError::from),
            Err(e) => Err(DispatchError::from(e)),
        };
        if let Err(e) = published {
            tracing::error!(
                subscriber_id = %subscriber.id,
                error.category = event_log::error::category::INFRASTRUCTURE,
                error.kind = event_log::error::kind::QUEUE,
                error = %e,
                "配信メッセージを投入できません"
            );
            self.record_subscriber_failure(dispatch, subscriber, description::PUBLISH_FAILED)
                .await;
            return false;
        }

        true
    }

    async fn record_subscriber_failure(
        &self,
        dispatch: &DispatchMessage,
        subscriber: &Subscriber,
        reason: &str,
    ) {
        let log = SendLog::failed(
            dispatch.event_id.clone(),
            dispatch.user_id.clone(),
            Some(subscriber.id.clone()),
            dispatch.campaign_id.clone(),
            reason,
            self.clock.now(),
        );
        if let Err(e) = self.send_logs.insert(&log).await {
            tracing::error!(
                subscriber_id = %subscriber.id,
                error = %e,
                "送信ログの記録に失敗しました"
            );
        }
    }

    /// キャンペーンを `failed` にし、キャンペーン単位の失敗ログを残す
    async fn fail(
        &self,
        campaign: Campaign,
        dispatch: &DispatchMessage,
        reason: &str,
    ) -> Result<HandleOutcome, DispatchError> {
        let now = self.clock.now();
        let failed = campaign.fail(now)?;
        let written = self
            .campaigns
            .update_status(&failed, &[CampaignStatus::Sending])
            .await?;
        if !written {
            tracing::warn!(reason, "キャンペーンは並行して終了済みのため failed に更新しません");
            return Ok(HandleOutcome::Ack);
        }

        let log = SendLog::failed(
            dispatch.event_id.clone(),
            dispatch.user_id.clone(),
            None,
            dispatch.campaign_id.clone(),
            reason,
            now,
        );
        if let Err(e) = self.send_logs.insert(&log).await {
            tracing::error!(error = %e, "送信ログの記録に失敗しました");
        }

        log_business_event!(
            event.category = event::category::CAMPAIGN,
            event.action = event::action::CAMPAIGN_FAILED,
            event.result = event::result::FAILURE,
            reason = reason,
            "キャンペーンを失敗にしました"
        );

        Ok(HandleOutcome::Ack)
    }

    async fn extend_visibility(&self, receipt_handle: &str) {
        match self
            .dispatch_queue
            .extend_visibility(receipt_handle, self.settings.visibility_extension)
            .await
        {
            Ok(()) => tracing::debug!(
                timeout_secs = self.settings.visibility_extension.as_secs(),
                "可視性タイムアウトを延長しました"
            ),
            Err(e) => tracing::warn!(
                error.category = event_log::error::category::INFRASTRUCTURE,
                error.kind = event_log::error::kind::QUEUE,
                error = %e,
                "可視性タイムアウトの延長に失敗しました"
            ),
        }
    }
}

#[async_trait]
impl MessageHandler for Campaigner {
    async fn handle(&self, message: &ReceivedMessage) -> HandleOutcome {
        let dispatch: DispatchMessage = match serde_json::from_str(&message.body) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                tracing::error!(
                    message_id = %message.message_id,
                    error.category = event_log::error::category::INPUT,
                    error.kind = event_log::error::kind::MALFORMED_MESSAGE,
                    error = %e,
                    "ディスパッチメッセージを解釈できないため破棄します"
                );
                return HandleOutcome::Ack;
            }
        };

        match self.fan_out(&dispatch, &message.receipt_handle).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    campaign_id = %dispatch.campaign_id,
                    user_id = %dispatch.user_id,
                    event_id = %dispatch.event_id,
                    error.kind = e.component(),
                    error = %e,
                    "ファンアウトを中断しました。再配信を待ちます"
                );
                HandleOutcome::Retry
            }
        }
    }
}
