//! # 購読者ページャ
//!
//! [`SubscriberRepository::find_page`] を繰り返し呼び、購読者集合を前方向に 1 回だけ走査する。
//!
//! ```text
//! next_page() ─▶ find_page(after = None)      ─▶ [a, b, c]   cursor = c
//! next_page() ─▶ find_page(after = c)         ─▶ [d]         limit 未満 → 終了
//! next_page() ─▶ None
//! ```
//!
//! - 走査上限 `created_until` は呼び出し側が走査開始時に 1 回だけ決める
//! - 返された行が前のカーソルより後ろにない場合は、ストレージの契約違反としてエラーにする
//!   （同じページを返し続けて無限ループになるのを防ぐ）

use mailcast_domain::subscriber::{
    Subscriber,
    SubscriberCursor,
    SubscriberFilter,
    SubscriberPageRequest,
};

use crate::{error::InfraError, repository::SubscriberRepository};

/// 購読者のキーセットページャ
pub struct SubscriberPager<'a> {
    repository: &'a dyn SubscriberRepository,
    filter:     SubscriberFilter,
    after:      Option<SubscriberCursor>,
    limit:      u32,
    exhausted:  bool,
    fetched:    u64,
}

impl<'a> SubscriberPager<'a> {
    /// `limit` が 0 の場合は 1 として扱う
    pub fn new(repository: &'a dyn SubscriberRepository, filter: SubscriberFilter, limit: u32) -> Self {
        Self {
            repository,
            filter,
            after: None,
            limit: limit.max(1),
            exhausted: false,
            fetched: 0,
        }
    }

    /// 次のページを取得する
    ///
    /// 走査が終わっていれば `Ok(None)` を返す。
    /// 最終ページ（`limit` 未満）は中身があれば `Some` で返し、次の呼び出しで `None` になる。
    pub async fn next_page(&mut self) -> Result<Option<Vec<Subscriber>>, InfraError> {
        if self.exhausted {
            return Ok(None);
        }

        let request = SubscriberPageRequest {
            filter: self.filter.clone(),
            after:  self.after,
            limit:  self.limit,
        };
        let page = self.repository.find_page(&request).await?;

        if request.is_last_page(page.len()) {
            self.exhausted = true;
        }

        let Some(last) = page.last() else {
            return Ok(None);
        };

        if let Some(previous) = &self.after {
            if !previous.precedes(last) {
                return Err(InfraError::unexpected(format!(
                    "購読者のカーソルが前進しません: {:?}",
                    previous
                )));
            }
        }

        self.after = Some(SubscriberCursor::after(last));
        self.fetched += page.len() as u64;

        Ok(Some(page))
    }

    /// これまでに返した購読者数
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
