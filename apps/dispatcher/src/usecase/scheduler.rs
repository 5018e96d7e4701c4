//! # スケジューラ
//!
//! 一定間隔で期限の来た配信スケジュールを探し、キャンペーンごとに
//! ディスパッチメッセージを 1 通投入する。
//!
//! ## 1 スケジュールの処理
//!
//! 1. ユーザー・送信設定・キャンペーン・テンプレート・セグメントを確認する
//!    （前提を満たさなければスキップし、スケジュールは次回に残す）
//! 2. ディスパッチメッセージを投入する
//! 3. キャンペーンがまだ `scheduled` なら `sending` にする
//! 4. スケジュールを削除する
//!
//! 投入してから状態を更新する。間でクラッシュすると次回に再投入されるが、
//! ファンアウト側が状態を見て重複を捨てる。

use std::{sync::Arc, time::Duration};

use mailcast_domain::{
    campaign::{CampaignSchedule, CampaignStatus},
    clock::Clock,
    message::DispatchMessage,
};
use mailcast_infra::{
    queue::MessageQueue,
    repository::{
        CampaignRepository,
        ScheduleRepository,
        SegmentRepository,
        TemplateRepository,
        UserRepository,
    },
};
use mailcast_shared::{event_log::event, log_business_event};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

/// 1 スケジュールの処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// ディスパッチメッセージを投入した
    Dispatched,
    /// 前提を満たさないためスキップした（スケジュールは残る）
    Skipped(String),
}

/// 1 回の tick の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub skipped:    usize,
    pub failed:     usize,
}

/// スケジューラ
pub struct Scheduler {
    schedules:      Arc<dyn ScheduleRepository>,
    campaigns:      Arc<dyn CampaignRepository>,
    templates:      Arc<dyn TemplateRepository>,
    segments:       Arc<dyn SegmentRepository>,
    users:          Arc<dyn UserRepository>,
    dispatch_queue: Arc<dyn MessageQueue>,
    clock:          Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        templates: Arc<dyn TemplateRepository>,
        segments: Arc<dyn SegmentRepository>,
        users: Arc<dyn UserRepository>,
        dispatch_queue: Arc<dyn MessageQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedules,
            campaigns,
            templates,
            segments,
            users,
            dispatch_queue,
            clock,
        }
    }

    /// キャンセルされるまで `interval` ごとに [`tick`](Self::tick) を実行する
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = interval.as_secs(), "スケジューラを起動しました");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "配信スケジュールの取得に失敗しました");
            }
        }
        tracing::info!("スケジューラを停止しました");
    }

    /// 期限の来たスケジュールをすべて処理する
    ///
    /// 個々のスケジュールの失敗は記録して続行する。
    /// エラーを返すのはスケジュール一覧の取得に失敗した場合のみ。
    #[tracing::instrument(skip_all)]
    pub async fn tick(&self) -> Result<TickReport, DispatchError> {
        let now = self.clock.now();
        let due = self.schedules.find_due(now).await?;
        let mut report = TickReport::default();

        for schedule in due {
            match self.dispatch(&schedule).await {
                Ok(ScheduleOutcome::Dispatched) => report.dispatched += 1,
                Ok(ScheduleOutcome::Skipped(reason)) => {
                    tracing::warn!(
                        campaign_id = %schedule.campaign_id,
                        user_id = %schedule.user_id,
                        event_id = %schedule.id,
                        reason = %reason,
                        "配信スケジュールをスキップしました"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(
                        campaign_id = %schedule.campaign_id,
                        user_id = %schedule.user_id,
                        event_id = %schedule.id,
                        error.kind = e.component(),
                        error = %e,
                        "キャンペーンのディスパッチに失敗しました"
                    );
                    report.failed += 1;
                }
            }
        }

        if report != TickReport::default() {
            tracing::info!(
                dispatched = report.dispatched,
                skipped = report.skipped,
                failed = report.failed,
                "スケジューラの tick が完了しました"
            );
        }
        Ok(report)
    }

    #[tracing::instrument(
        skip_all,
        fields(campaign_id = %schedule.campaign_id, event_id = %schedule.id)
    )]
    async fn dispatch(&self, schedule: &CampaignSchedule) -> Result<ScheduleOutcome, DispatchError> {
        let skip = |reason: &str| -> Result<ScheduleOutcome, DispatchError> {
            Ok(ScheduleOutcome::Skipped(reason.to_string()))
        };

        let Some(user) = self.users.find_by_id(&schedule.user_id).await? else {
            return skip("ユーザーが見つかりません");
        };
        let Some(settings) = self.users.find_provider_settings(&user.id).await? else {
            return skip("送信プロバイダの認証情報が登録されていません");
        };

        let Some(campaign) = self.campaigns.find_by_id(&schedule.campaign_id).await? else {
            return skip("キャンペーンが見つかりません");
        };
        if campaign.user_id() != &user.id {
            return skip("キャンペーンの所有者がスケジュールと一致しません");
        }
        if campaign.status() != CampaignStatus::Scheduled {
            return Ok(ScheduleOutcome::Skipped(format!(
                "キャンペーンが scheduled 状態ではありません: {}",
                campaign.status()
            )));
        }

        let Some(template) = self
            .templates
            .find_by_id(campaign.template_id(), &user.id)
            .await?
        else {
            return skip("テンプレートが見つかりません");
        };
        if let Err(e) = template.validate_variables(&schedule.template_data) {
            return Ok(ScheduleOutcome::Skipped(e.to_string()));
        }

        let segments = self
            .segments
            .find_by_ids(&user.id, &schedule.segment_ids)
            .await?;
        if segments.is_empty() {
            return skip("対象セグメントが 1 件も見つかりません");
        }

        let message = DispatchMessage {
            event_id:                 schedule.event_id().clone(),
            campaign_id:              campaign.id().clone(),
            segment_ids:              segments.into_iter().map(|s| s.id).collect(),
            template_data:            schedule.template_data.clone(),
            source:                   schedule.sender.formatted(),
            user_id:                  user.id.clone(),
            user_uuid:                user.uuid,
            configuration_set_exists: settings.configuration_set_exists,
            provider_keys:            settings.keys,
        };
        let body = serde_json::to_string(&message)?;
        self.dispatch_queue.publish(&body).await?;

        // 投入直後にキャンペーナーが先に進めている場合は上書きしない
        let sending = campaign.start_sending()?;
        let written = self
            .campaigns
            .update_status(&sending, &[CampaignStatus::Scheduled])
            .await?;
        if !written {
            tracing::debug!("キャンペーンは既に scheduled から遷移済みのため状態を更新しません");
        }

        if let Err(e) = self.schedules.delete(&schedule.id).await {
            tracing::error!(error = %e, "配信スケジュールの削除に失敗しました");
        }

        log_business_event!(
            event.category = event::category::CAMPAIGN,
            event.action = event::action::CAMPAIGN_DISPATCHED,
            event.result = event::result::SUCCESS,
            campaign_id = %message.campaign_id,
            user_id = %message.user_id,
            event_id = %message.event_id,
            segments = message.segment_ids.len(),
            "キャンペーンをディスパッチしました"
        );

        Ok(ScheduleOutcome::Dispatched)
    }
}
