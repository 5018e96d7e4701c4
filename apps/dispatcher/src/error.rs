//! # Dispatcher エラー定義
//!
//! ユースケース内部で発生するエラー。
//!
//! ステージのハンドラはこのエラーをワーカープールへ伝播させず、
//! [`HandleOutcome`](crate::worker::HandleOutcome) に変換して返す。

use mailcast_domain::DomainError;
use mailcast_infra::InfraError;
use thiserror::Error;

/// ユースケース層で発生するエラー
#[derive(Debug, Error)]
pub enum DispatchError {
    /// ストレージ・キュー・キャッシュのエラー（再試行で回復しうる）
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// 状態遷移などのドメインルール違反
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// メッセージのシリアライズ失敗
    #[error("メッセージのシリアライズに失敗: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    /// ログの `error.kind` に出す値
    pub fn component(&self) -> &'static str {
        match self {
            Self::Infra(e) => e.component(),
            Self::Domain(_) => "domain",
            Self::Serialization(_) => "serialization",
        }
    }
}
