//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するシードデータ挿入ヘルパー。
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use mailcast_domain::{
    campaign::{CampaignId, CampaignScheduleId},
    segment::SegmentId,
    subscriber::SubscriberId,
    template::TemplateId,
    user::UserId,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// テスト用の固定日時
pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// ユーザーを作成する（送信設定付き）
pub async fn insert_user(pool: &PgPool) -> UserId {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id, uuid, email, name) VALUES ($1, $2, $3, 'テスト送信者')")
        .bind(id)
        .bind(Uuid::now_v7())
        .bind(format!("{}@example.com", id))
        .execute(pool)
        .await
        .expect("ユーザー作成に失敗");

    sqlx::query(
        r#"
        INSERT INTO provider_keys (user_id, access_key_id, secret_access_key, region, configuration_set_exists)
        VALUES ($1, 'AKIATEST', 'secret', 'ap-northeast-1', TRUE)
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .expect("送信設定の作成に失敗");

    UserId::from_uuid(id)
}

pub async fn insert_segment(pool: &PgPool, user_id: &UserId) -> SegmentId {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO segments (id, user_id, name) VALUES ($1, $2, 'テストセグメント')")
        .bind(id)
        .bind(user_id.as_uuid())
        .execute(pool)
        .await
        .expect("セグメント作成に失敗");
    SegmentId::from_uuid(id)
}

/// 購読者を作成し、指定セグメントに所属させる
///
/// `offset_secs` は [`test_now`] からの作成時刻のずれ。
pub async fn insert_subscriber(
    pool: &PgPool,
    user_id: &UserId,
    segments: &[&SegmentId],
    offset_secs: i64,
) -> SubscriberId {
    insert_subscriber_with(pool, user_id, segments, offset_secs, true, false).await
}

pub async fn insert_subscriber_with(
    pool: &PgPool,
    user_id: &UserId,
    segments: &[&SegmentId],
    offset_secs: i64,
    active: bool,
    blacklisted: bool,
) -> SubscriberId {
    let id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO subscribers (id, user_id, email, name, metadata, active, blacklisted, created_at)
        VALUES ($1, $2, $3, '購読者', $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(user_id.as_uuid())
    .bind(format!("{}@example.com", id))
    .bind(json!({ "plan": "free" }))
    .bind(active)
    .bind(blacklisted)
    .bind(test_now() + Duration::seconds(offset_secs))
    .execute(pool)
    .await
    .expect("購読者作成に失敗");

    for segment_id in segments {
        sqlx::query("INSERT INTO segment_subscribers (segment_id, subscriber_id) VALUES ($1, $2)")
            .bind(segment_id.as_uuid())
            .bind(id)
            .execute(pool)
            .await
            .expect("セグメント所属の作成に失敗");
    }

    SubscriberId::from_uuid(id)
}

pub async fn delete_subscriber(pool: &PgPool, id: &SubscriberId) {
    sqlx::query("DELETE FROM subscribers WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await
        .expect("購読者削除に失敗");
}

pub async fn insert_template(pool: &PgPool, user_id: &UserId) -> TemplateId {
    let id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO templates (id, user_id, name, subject_part, html_part, text_part)
        VALUES ($1, $2, 'welcome', '{{ name }} さんへ', '<p>{{ name }}</p>', '{{ name }}')
        "#,
    )
    .bind(id)
    .bind(user_id.as_uuid())
    .execute(pool)
    .await
    .expect("テンプレート作成に失敗");
    TemplateId::from_uuid(id)
}

pub async fn insert_campaign(
    pool: &PgPool,
    user_id: &UserId,
    template_id: &TemplateId,
    status: &str,
) -> CampaignId {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO campaigns (id, user_id, template_id, name, status) VALUES ($1, $2, $3, '秋のお知らせ', $4)",
    )
    .bind(id)
    .bind(user_id.as_uuid())
    .bind(template_id.as_uuid())
    .bind(status)
    .execute(pool)
    .await
    .expect("キャンペーン作成に失敗");
    CampaignId::from_uuid(id)
}

pub async fn insert_schedule(
    pool: &PgPool,
    campaign_id: &CampaignId,
    user_id: &UserId,
    segments: &[&SegmentId],
    scheduled_at: DateTime<Utc>,
) -> CampaignScheduleId {
    let id = Uuid::now_v7();
    let segment_ids: Vec<Uuid> = segments.iter().map(|s| *s.as_uuid()).collect();
    sqlx::query(
        r#"
        INSERT INTO campaign_schedules
            (id, campaign_id, user_id, scheduled_at, segment_ids, template_data, sender_address, sender_name)
        VALUES ($1, $2, $3, $4, $5, $6, 'news@example.com', 'Example News')
        "#,
    )
    .bind(id)
    .bind(campaign_id.as_uuid())
    .bind(user_id.as_uuid())
    .bind(scheduled_at)
    .bind(&segment_ids)
    .bind(json!({ "season": "秋" }))
    .execute(pool)
    .await
    .expect("スケジュール作成に失敗");
    CampaignScheduleId::from_uuid(id)
}
