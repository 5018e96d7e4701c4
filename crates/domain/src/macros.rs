/// UUID v7 をラップした ID 型を定義する
///
/// キャンペーン・購読者・送信ログなどの ID はすべてこのマクロで作る。
/// 生成される型はキューのメッセージ本文に素の UUID 文字列として載り（`serde(transparent)`）、
/// 購読者のキーセット走査ではタイブレークとして比較される（`Ord`）。
///
/// 比較はバイト列順で、PostgreSQL の `uuid` 型の並びと一致する。
/// v7 は先頭がミリ秒タイムスタンプなので、同じプロセスで続けて作った ID は作成順に並ぶ。
///
/// ```rust
/// use mailcast_domain::send_log::SendLogId;
///
/// let first = SendLogId::new();
/// let second = SendLogId::new();
/// assert!(first < second);
///
/// let json = serde_json::to_string(&first).unwrap();
/// assert_eq!(json, format!("\"{}\"", first.as_uuid()));
/// ```
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        $vis struct $Name(uuid::Uuid);

        impl $Name {
            /// 現在時刻から採番する
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// 保存済みの値から復元する（バージョンは検査しない）
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $Name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}
