//! # ビジネスイベントログの構造化ヘルパー
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! フィールドはドット記法（`event.category`、`event.action`）で命名する。
//! JSON 出力ではフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: [`event::category`] の定数
/// - `event.action`: [`event::action`] の定数
/// - `event.result`: [`event::result`] の定数
///
/// ## 推奨フィールド
///
/// - `campaign_id` / `user_id` / `event_id` / `subscriber_id`
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const CAMPAIGN: &str = "campaign";
        pub const EMAIL: &str = "email";
    }

    /// イベントアクション
    pub mod action {
        // キャンペーン
        pub const CAMPAIGN_DISPATCHED: &str = "campaign.dispatched";
        pub const CAMPAIGN_SENT: &str = "campaign.sent";
        pub const CAMPAIGN_FAILED: &str = "campaign.failed";

        // 個別メール
        pub const EMAIL_SENT: &str = "email.sent";
        pub const EMAIL_FAILED: &str = "email.failed";
        pub const EMAIL_DEFERRED: &str = "email.deferred";
        pub const EMAIL_DUPLICATE: &str = "email.duplicate";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
        pub const SKIPPED: &str = "skipped";
    }
}

/// エラーコンテキストフィールドの定数
///
/// `tracing::error!` に `error.category` + `error.kind` として付与する。
pub mod error {
    pub mod category {
        /// DB・Redis・キュー
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 送信プロバイダ
        pub const EXTERNAL_SERVICE: &str = "external_service";
        /// メッセージ内容やテンプレートの不備
        pub const INPUT: &str = "input";
    }

    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const CACHE: &str = "cache";
        pub const QUEUE: &str = "queue";
        pub const PROVIDER: &str = "provider";
        pub const TEMPLATE: &str = "template";
        pub const MALFORMED_MESSAGE: &str = "malformed_message";
    }
}
