//! # 購読者とキーセットページング
//!
//! 購読者エンティティと、購読者集合を走査するためのカーソル・クエリ条件を定義する。
//!
//! ## キーセットページング
//!
//! オフセットではなく `(created_at, id)` の複合キーで「この行の次から」を表す。
//! 走査中に行が挿入・削除されても、同じ行を 2 回返したり読み飛ばしたりしない。
//!
//! ```text
//! page 1: (t1,a) (t1,b) (t2,c)          → cursor = (t2,c)
//! page 2: (t3,d) (t4,e)  ← limit 未満  → 走査終了
//! ```
//!
//! - 順序は `(created_at, id)` の昇順で厳密に単調増加
//! - 走査開始時刻 `created_until` より後に作成された行は対象外
//!   （長時間のファンアウト中に新規登録が続いても走査が終わらなくならない）
//! - 走査中に削除された行は次ページに現れないだけでエラーにはならない
//! - 複数セグメントに所属する購読者も 1 回だけ返す（リポジトリ実装の責務）

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{segment::SegmentId, user::UserId};

define_uuid_id! {
    /// 購読者 ID
    pub struct SubscriberId;
}

/// 購読者
///
/// 登録・インポート・配信停止は外部コンポーネントが行う。
/// 配信パイプラインからは読み取り専用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id:          SubscriberId,
    pub user_id:     UserId,
    pub email:       String,
    pub name:        String,
    /// 任意のメタデータ（テンプレート変数として使う）
    pub metadata:    HashMap<String, String>,
    pub active:      bool,
    pub blacklisted: bool,
    pub created_at:  DateTime<Utc>,
}

/// キーセットページングのカーソル
///
/// 「この行より後から再開する」を表す。永続化しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberCursor {
    pub created_at: DateTime<Utc>,
    pub id:         uuid::Uuid,
}

impl SubscriberCursor {
    /// ページの最終行からカーソルを作る
    pub fn after(subscriber: &Subscriber) -> Self {
        Self {
            created_at: subscriber.created_at,
            id:         *subscriber.id.as_uuid(),
        }
    }

    /// 購読者がこのカーソルより厳密に後ろにあるか
    pub fn precedes(&self, subscriber: &Subscriber) -> bool {
        (subscriber.created_at, *subscriber.id.as_uuid()) > (self.created_at, self.id)
    }
}

/// 購読者の走査条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFilter {
    pub user_id:             UserId,
    pub segment_ids:         Vec<SegmentId>,
    pub exclude_blacklisted: bool,
    pub require_active:      bool,
    /// 走査上限（走査開始時刻）。これより後に作成された行は返さない
    pub created_until:       DateTime<Utc>,
}

impl SubscriberFilter {
    /// キャンペーン配信用の条件（配信停止・非アクティブを除外）
    pub fn deliverable(
        user_id: UserId,
        segment_ids: Vec<SegmentId>,
        created_until: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            segment_ids,
            exclude_blacklisted: true,
            require_active: true,
            created_until,
        }
    }

    /// セグメント所属以外の条件を満たすか
    ///
    /// セグメント所属の判定はストレージ側（JOIN / EXISTS）で行う。
    pub fn accepts(&self, subscriber: &Subscriber) -> bool {
        subscriber.user_id == self.user_id
            && subscriber.created_at <= self.created_until
            && !(self.exclude_blacklisted && subscriber.blacklisted)
            && !(self.require_active && !subscriber.active)
    }
}

/// 1 ページ分の取得要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberPageRequest {
    pub filter: SubscriberFilter,
    /// `None` なら先頭から
    pub after:  Option<SubscriberCursor>,
    pub limit:  u32,
}

impl SubscriberPageRequest {
    /// 取得件数が `limit` 未満なら走査終了
    pub fn is_last_page(&self, fetched: usize) -> bool {
        fetched < self.limit as usize
    }
}
