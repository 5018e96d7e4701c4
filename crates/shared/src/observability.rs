//! # トレーシング初期化
//!
//! ディスパッチャのプロセス起動時に 1 回だけ subscriber を組み立てる。
//!
//! - 出力形式は `LOG_FORMAT`（`json` / `pretty`）。本番は JSON で、1 行 1 イベント
//! - レベルは `RUST_LOG`。未設定なら [`DEFAULT_FILTER`]
//! - `tracing_error::ErrorLayer` を積むので、`InfraError` の `SpanTrace` に
//!   `campaign_id` や `event_id` を持つスパンが残る

use std::{fmt, str::FromStr};

/// `RUST_LOG` 未設定時のフィルタ。自前のクレートだけ debug まで出す
pub const DEFAULT_FILTER: &str = "info,mailcast=debug";

/// ログの出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// フラットなキーの JSON（`event.kind` などをそのまま検索できる）
    Json,
    #[default]
    Pretty,
}

/// 未知の `LOG_FORMAT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLogFormat(pub String);

impl fmt::Display for UnknownLogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "未知のログ形式です（json / pretty）: {:?}", self.0)
    }
}

impl std::error::Error for UnknownLogFormat {}

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    /// 前後の空白と大文字小文字は区別しない
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(UnknownLogFormat(s.to_string())),
        }
    }
}

/// subscriber の組み立てに必要な値
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// 起動ログに出すサービス名
    pub service_name: String,
    pub log_format:   LogFormat,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
        }
    }
}

/// グローバル subscriber を登録する
///
/// 2 回目以降の呼び出しは panic する（`tracing_subscriber` の `init` と同じ）。
#[cfg(feature = "observability")]
pub fn init_tracing(config: TracingConfig) {
    use tracing_subscriber::{EnvFilter, Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // JSON ではスパン一覧を出さず、直近のスパン（campaign_id などを持つ）だけを載せる
    let formatter = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(formatter)
        .with(tracing_error::ErrorLayer::default())
        .init();

    tracing::debug!(
        service = %config.service_name,
        format = ?config.log_format,
        "トレーシングを初期化しました"
    );
}
