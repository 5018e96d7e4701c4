//! # セグメント
//!
//! 購読者のグループ。キャンペーンの配信対象はセグメント ID の集合で指定する。
//! 購読者は 0 個以上のセグメントに所属できる。

use crate::user::UserId;

define_uuid_id! {
    /// セグメント ID
    pub struct SegmentId;
}

/// セグメント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id:      SegmentId,
    pub user_id: UserId,
    pub name:    String,
}
