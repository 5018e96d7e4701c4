//! # インフラ層エラー
//!
//! PostgreSQL・Redis・SQS とのやり取りで起きた失敗を 1 つの型にまとめる。
//! ディスパッチャはこの型を見て「再配信を待つ」かどうかを決めるだけで、
//! 中身の種別はログの `error.kind` に出すために使う。
//!
//! 生成時点のスパン（`campaign_id` / `event_id` などのフィールド付き）を
//! [`SpanTrace`] として保持するので、ワーカーの外でログを出しても
//! どのキャンペーンの処理で起きたかを追える。

use std::fmt;

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層で発生するエラー
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// 失敗した接続先ごとの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// 重複排除キャッシュ
    #[error("Redis エラー: {0}")]
    Redis(#[source] redis::RedisError),

    #[error("シリアライズエラー: {0}")]
    Serialization(#[source] serde_json::Error),

    /// SQS の呼び出し失敗。SDK のエラーは文脈付きの文字列にして持つ
    #[error("キューエラー: {0}")]
    Queue(String),

    /// 保存済みの行が解釈できないなど、再試行しても直らない不整合
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

impl InfraErrorKind {
    /// ログの `error.kind` に出す値
    pub fn component(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Redis(_) => "cache",
            Self::Queue(_) => "queue",
            Self::Serialization(_) => "serialization",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

impl InfraError {
    fn capture(kind: InfraErrorKind) -> Self {
        Self {
            kind,
            span_trace: SpanTrace::capture(),
        }
    }

    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    /// [`InfraErrorKind::component`] の短縮
    pub fn component(&self) -> &'static str {
        self.kind.component()
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::capture(InfraErrorKind::Queue(msg.into()))
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::capture(InfraErrorKind::Unexpected(msg.into()))
    }
}

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        Self::capture(InfraErrorKind::Database(source))
    }
}

impl From<redis::RedisError> for InfraError {
    fn from(source: redis::RedisError) -> Self {
        Self::capture(InfraErrorKind::Redis(source))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(source: serde_json::Error) -> Self {
        Self::capture(InfraErrorKind::Serialization(source))
    }
}
