//! # キャンペーン
//!
//! キャンペーンとその配信スケジュールを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 備考 |
//! |---|------------|------|
//! | [`Campaign`] | キャンペーン | テンプレートを参照し、セグメントに配信される |
//! | [`CampaignStatus`] | キャンペーン状態 | `draft` → `scheduled` → `sending` → {`sent`, `failed`} |
//! | [`CampaignSchedule`] | 配信スケジュール | 1 キャンペーンにつき有効なものは 1 件 |
//! | [`EventId`] | イベント ID | スケジュール ID を流用。送信重複排除のキーになる |
//!
//! ## 状態遷移
//!
//! ```text
//! draft ──▶ scheduled ──▶ sending ──▶ sent
//!               │            │
//!               └────────────┴──────▶ failed
//! ```
//!
//! - `sending` への遷移は `scheduled` / `sending` から許可する（同一状態への再適用は冪等）
//! - `sent` は `sending` からのみ、`failed` は `scheduled` / `sending` から遷移する
//! - `completed_at` は `sent` / `failed` のときだけ設定される

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    segment::SegmentId,
    template::{TemplateData, TemplateId},
    user::UserId,
};

define_uuid_id! {
    /// キャンペーン ID
    pub struct CampaignId;
}

define_uuid_id! {
    /// 配信スケジュール ID
    ///
    /// UUID v7 で全体順序を持つ。ディスパッチ時のイベント ID として再利用する。
    pub struct CampaignScheduleId;
}

/// イベント ID
///
/// 1 回のディスパッチ（スケジュールの発火）を識別する。
/// ディスパッチメッセージが重複しても同じ値になるため、送信の冪等性キーに使える。
pub type EventId = CampaignScheduleId;

/// キャンペーンステータス
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
pub enum CampaignStatus {
    /// 下書き
    Draft,
    /// 配信予約済み
    Scheduled,
    /// 配信中
    Sending,
    /// 配信完了
    Sent,
    /// 配信失敗
    Failed,
}

impl CampaignStatus {
    /// 終端状態かどうか
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// キャンペーンエンティティ
///
/// # 不変条件
///
/// - `completed_at` は `status` が `Sent` / `Failed` のときのみ `Some`
/// - 終端状態からの遷移はできない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    id:           CampaignId,
    user_id:      UserId,
    template_id:  TemplateId,
    name:         String,
    status:       CampaignStatus,
    completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// 下書き状態のキャンペーンを作成する
    pub fn new(
        id: CampaignId,
        user_id: UserId,
        template_id: TemplateId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            template_id,
            name: name.into(),
            status: CampaignStatus::Draft,
            completed_at: None,
        }
    }

    /// データベースから復元する
    pub fn from_db(
        id: CampaignId,
        user_id: UserId,
        template_id: TemplateId,
        name: String,
        status: CampaignStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            user_id,
            template_id,
            name,
            status,
            completed_at,
        }
    }

    pub fn id(&self) -> &CampaignId {
        &self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// 配信予約する（`draft` / `scheduled` → `scheduled`）
    ///
    /// スケジュールの作成・差し替えを担う外部コンポーネント向け。
    pub fn schedule(self) -> Result<Self, DomainError> {
        match self.status {
            CampaignStatus::Draft | CampaignStatus::Scheduled => Ok(Self {
                status: CampaignStatus::Scheduled,
                ..self
            }),
            from => Err(Self::invalid_transition(from, CampaignStatus::Scheduled)),
        }
    }

    /// 配信を開始する（`scheduled` / `sending` → `sending`）
    pub fn start_sending(self) -> Result<Self, DomainError> {
        match self.status {
            CampaignStatus::Scheduled | CampaignStatus::Sending => Ok(Self {
                status: CampaignStatus::Sending,
                ..self
            }),
            from => Err(Self::invalid_transition(from, CampaignStatus::Sending)),
        }
    }

    /// 配信を完了する（`sending` → `sent`）
    pub fn complete(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.status {
            CampaignStatus::Sending => Ok(Self {
                status: CampaignStatus::Sent,
                completed_at: Some(now),
                ..self
            }),
            from => Err(Self::invalid_transition(from, CampaignStatus::Sent)),
        }
    }

    /// 配信を失敗させる（`scheduled` / `sending` → `failed`）
    pub fn fail(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.status {
            CampaignStatus::Scheduled | CampaignStatus::Sending => Ok(Self {
                status: CampaignStatus::Failed,
                completed_at: Some(now),
                ..self
            }),
            from => Err(Self::invalid_transition(from, CampaignStatus::Failed)),
        }
    }

    fn invalid_transition(from: CampaignStatus, to: CampaignStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            entity_type: "Campaign",
            from:        from.to_string(),
            to:          to.to_string(),
        }
    }
}

/// 送信元の識別情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    /// 送信元メールアドレス（プロバイダで検証済みであること）
    pub address: String,
    /// 表示名（空文字列なら省略）
    pub name:    String,
}

impl SenderIdentity {
    /// `From` ヘッダー形式に整形する
    ///
    /// 表示名があれば `"名前 <address>"`、なければアドレスのみ。
    pub fn formatted(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", name, self.address)
        }
    }
}

/// 配信スケジュール
///
/// スケジュール作成側のコンポーネントが作成・差し替えし、
/// ディスパッチまたはキャンセル時に削除される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignSchedule {
    pub id:            CampaignScheduleId,
    pub campaign_id:   CampaignId,
    pub user_id:       UserId,
    pub scheduled_at:  DateTime<Utc>,
    pub segment_ids:   Vec<SegmentId>,
    /// テンプレート変数のデフォルト値
    pub template_data: TemplateData,
    pub sender:        SenderIdentity,
}

impl CampaignSchedule {
    /// 指定時刻の時点で配信期限が到来しているか
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }

    /// このスケジュールを発火したディスパッチのイベント ID
    pub fn event_id(&self) -> &EventId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Duration;
    use rstest::rstest;

    use super::*;

    fn make_campaign(status: CampaignStatus) -> Campaign {
        Campaign::from_db(
            CampaignId::new(),
            UserId::new(),
            TemplateId::new(),
            "秋のセール".to_string(),
            status,
            None,
        )
    }

    #[rstest]
    #[case(CampaignStatus::Draft, "draft")]
    #[case(CampaignStatus::Scheduled, "scheduled")]
    #[case(CampaignStatus::Sending, "sending")]
    #[case(CampaignStatus::Sent, "sent")]
    #[case(CampaignStatus::Failed, "failed")]
    fn campaign_statusの文字列変換が往復する(
        #[case] status: CampaignStatus,
        #[case] expected: &str,
    ) {
        assert_eq!(status.to_string(), expected);
        assert_eq!(CampaignStatus::from_str(expected).unwrap(), status);
    }

    #[rstest]
    #[case("paused")]
    #[case("Sent")]
    #[case("")]
    fn 未知のステータス文字列はパースエラー(#[case] input: &str) {
        assert_eq!(
            CampaignStatus::from_str(input),
            Err(strum::ParseError::VariantNotFound)
        );
    }

    #[test]
    fn 新規キャンペーンは下書き状態() {
        let campaign = Campaign::new(CampaignId::new(), UserId::new(), TemplateId::new(), "x");

        assert_eq!(campaign.status(), CampaignStatus::Draft);
        assert!(campaign.completed_at().is_none());
    }

    #[rstest]
    #[case(CampaignStatus::Scheduled)]
    #[case(CampaignStatus::Sending)]
    fn start_sendingはscheduledとsendingから遷移できる(#[case] from: CampaignStatus) {
        let campaign = make_campaign(from).start_sending().unwrap();

        assert_eq!(campaign.status(), CampaignStatus::Sending);
        assert!(campaign.completed_at().is_none());
    }

    #[rstest]
    #[case(CampaignStatus::Draft)]
    #[case(CampaignStatus::Sent)]
    #[case(CampaignStatus::Failed)]
    fn start_sendingはそれ以外の状態から遷移できない(#[case] from: CampaignStatus) {
        let result = make_campaign(from).start_sending();

        assert!(matches!(
            result,
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn completeでsentになりcompleted_atが設定される() {
        let now = Utc::now();
        let campaign = make_campaign(CampaignStatus::Sending)
            .complete(now)
            .unwrap();

        assert_eq!(campaign.status(), CampaignStatus::Sent);
        assert_eq!(campaign.completed_at(), Some(now));
    }

    #[test]
    fn scheduledからはcompleteできない() {
        let result = make_campaign(CampaignStatus::Scheduled).complete(Utc::now());

        assert!(result.is_err());
    }

    #[rstest]
    #[case(CampaignStatus::Scheduled)]
    #[case(CampaignStatus::Sending)]
    fn failでfailedになりcompleted_atが設定される(#[case] from: CampaignStatus) {
        let now = Utc::now();
        let campaign = make_campaign(from).fail(now).unwrap();

        assert_eq!(campaign.status(), CampaignStatus::Failed);
        assert_eq!(campaign.completed_at(), Some(now));
    }

    #[test]
    fn 終端状態からは失敗に遷移できない() {
        assert!(make_campaign(CampaignStatus::Sent).fail(Utc::now()).is_err());
        assert!(
            make_campaign(CampaignStatus::Failed)
                .fail(Utc::now())
                .is_err()
        );
    }

    #[test]
    fn scheduleは下書きから予約済みに遷移する() {
        let campaign = make_campaign(CampaignStatus::Draft).schedule().unwrap();

        assert_eq!(campaign.status(), CampaignStatus::Scheduled);
    }

    #[test]
    fn is_terminalはsentとfailedのみtrue() {
        assert!(CampaignStatus::Sent.is_terminal());
        assert!(CampaignStatus::Failed.is_terminal());
        assert!(!CampaignStatus::Sending.is_terminal());
        assert!(!CampaignStatus::Scheduled.is_terminal());
        assert!(!CampaignStatus::Draft.is_terminal());
    }

    #[test]
    fn sender_identityは表示名の有無で整形が変わる() {
        let named = SenderIdentity {
            address: "news@example.com".to_string(),
            name:    "Example News".to_string(),
        };
        let bare = SenderIdentity {
            address: "news@example.com".to_string(),
            name:    "  ".to_string(),
        };

        assert_eq!(named.formatted(), "Example News <news@example.com>");
        assert_eq!(bare.formatted(), "news@example.com");
    }

    #[test]
    fn is_dueは予定時刻ちょうどを含む() {
        let now = Utc::now();
        let schedule = CampaignSchedule {
            id:            CampaignScheduleId::new(),
            campaign_id:   CampaignId::new(),
            user_id:       UserId::new(),
            scheduled_at:  now,
            segment_ids:   vec![],
            template_data: TemplateData::new(),
            sender:        SenderIdentity {
                address: "a@example.com".to_string(),
                name:    String::new(),
            },
        };

        assert!(schedule.is_due(now));
        assert!(schedule.is_due(now + Duration::seconds(1)));
        assert!(!schedule.is_due(now - Duration::seconds(1)));
    }
}
