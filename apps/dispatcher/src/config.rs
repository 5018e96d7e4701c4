//! # Dispatcher 設定
//!
//! 環境変数から配信パイプラインの設定を読み込む。
//!
//! 必須の変数が未設定、または値が不正な場合は [`ConfigError`] を返す。

use std::{env, str::FromStr, time::Duration};

use mailcast_infra::cache::DEFAULT_DEDUP_TTL;
use mailcast_shared::observability::LogFormat;
use thiserror::Error;

/// 設定読み込みのエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    #[error("{name} の値が不正です: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// 送信プロバイダの種類（`EMAIL_PROVIDER`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailProviderKind {
    /// Amazon SES v2（本番）
    Ses,
    /// SMTP（Mailpit などの開発用サーバー）
    Smtp,
    /// 送信しない（ログ出力のみ）
    Noop,
}

impl FromStr for EmailProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ses" => Ok(Self::Ses),
            "smtp" => Ok(Self::Smtp),
            "noop" => Ok(Self::Noop),
            _ => Err(()),
        }
    }
}

/// 配信パイプラインの設定
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// データベース接続 URL
    pub database_url:         String,
    /// Redis 接続 URL（重複排除キャッシュ）
    pub redis_url:            String,
    /// ディスパッチメッセージのキュー URL
    pub dispatch_queue_url:   String,
    /// 配信メッセージのキュー URL
    pub delivery_queue_url:   String,
    /// SQS エンドポイント URL（ElasticMQ 使用時に設定、未設定で AWS デフォルト）
    pub sqs_endpoint_url:     Option<String>,
    pub aws_region:           String,
    /// スケジューラの実行間隔
    pub scheduler_interval:   Duration,
    pub campaigner_workers:   usize,
    pub sender_workers:       usize,
    /// 購読者のページサイズ
    pub subscriber_page_size: u32,
    /// ディスパッチキューの受信時とファンアウト中に設定する可視性タイムアウト
    pub visibility_extension: Duration,
    pub dedup_ttl:            Duration,
    pub email_provider:       EmailProviderKind,
    /// SMTP ホスト（email_provider=smtp の場合に使用）
    pub smtp_host:            String,
    /// SMTP ポート（email_provider=smtp の場合に使用）
    pub smtp_port:            u16,
    pub log_format:           LogFormat,
}

impl DispatcherConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の参照関数から設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };

        Ok(Self {
            database_url:         vars.required("DATABASE_URL")?,
            redis_url:            vars.required("REDIS_URL")?,
            dispatch_queue_url:   vars.required("DISPATCH_QUEUE_URL")?,
            delivery_queue_url:   vars.required("DELIVERY_QUEUE_URL")?,
            sqs_endpoint_url:     vars.optional("SQS_ENDPOINT_URL"),
            aws_region:           vars
                .optional("AWS_REGION")
                .unwrap_or_else(|| "ap-northeast-1".to_string()),
            scheduler_interval:   Duration::from_secs(vars.parsed_positive("SCHEDULER_INTERVAL_SECS", 60)?),
            campaigner_workers:   vars.parsed_positive("CAMPAIGNER_WORKERS", 10)?,
            sender_workers:       vars.parsed_positive("SENDER_WORKERS", 50)?,
            subscriber_page_size: vars.parsed_positive("SUBSCRIBER_PAGE_SIZE", 1000)?,
            visibility_extension: Duration::from_secs(vars.parsed_positive("VISIBILITY_EXTENSION_SECS", 300)?),
            dedup_ttl:            Duration::from_secs(
                vars.parsed_positive("DEDUP_TTL_SECS", DEFAULT_DEDUP_TTL.as_secs())?,
            ),
            email_provider:       vars.parsed("EMAIL_PROVIDER", EmailProviderKind::Ses)?,
            smtp_host:            vars
                .optional("SMTP_HOST")
                .unwrap_or_else(|| "localhost".to_string()),
            smtp_port:            vars.parsed("SMTP_PORT", 1025)?,
            log_format:           vars.parsed("LOG_FORMAT", LogFormat::default())?,
        })
    }

    /// 可視性タイムアウトを延長する間隔（延長幅の半分）
    pub fn extend_interval(&self) -> Duration {
        self.visibility_extension / 2
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value }),
            None => Ok(default),
        }
    }

    /// 0 を不正値として扱う数値
    fn parsed_positive<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialEq + Default,
    {
        let value = self.parsed(name, default)?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                name,
                value: "0".to_string(),
            });
        }
        Ok(value)
    }
}
