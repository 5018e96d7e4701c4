//! # メッセージキュー
//!
//! at-least-once 配送のキュー抽象と、Amazon SQS による実装。
//!
//! ## キューの契約
//!
//! - 受信したメッセージは可視性タイムアウトの間、他の受信者から見えなくなる
//! - 明示的に削除（ack）しない限り、タイムアウト後に再配信される
//! - 可視性タイムアウトは処理中に延長できる
//! - メッセージ間の順序は保証しない
//!
//! ## 接続先
//!
//! - **ローカル開発**: ElasticMQ / LocalStack（`SQS_ENDPOINT_URL` で接続先を指定）
//! - **本番環境**: IAM ロールによる認証で Amazon SQS に接続

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::{Client, error::DisplayErrorContext};

use crate::InfraError;

/// 1 回の受信で取得する最大件数（SQS の上限）
pub const MAX_RECEIVE_BATCH: usize = 10;

/// SQS が受け付ける可視性タイムアウトの上限（12 時間）
const MAX_VISIBILITY_SECS: u64 = 43_200;

fn visibility_seconds(timeout: Duration) -> i32 {
    timeout.as_secs().min(MAX_VISIBILITY_SECS) as i32
}

/// 受信したメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id:     String,
    /// 削除・可視性延長に使うハンドル（受信ごとに変わる）
    pub receipt_handle: String,
    pub body:           String,
}

/// メッセージキューのインターフェース
///
/// 1 インスタンスが 1 本のキューに対応する。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// メッセージを投入し、キューが採番したメッセージ ID を返す
    async fn publish(&self, body: &str) -> Result<String, InfraError>;

    /// ロングポーリングで最大 `max_messages` 件を受信する
    ///
    /// `wait` の間にメッセージがなければ空の Vec を返す。
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, InfraError>;

    /// 受信中のメッセージの可視性タイムアウトを「今から `timeout`」に設定し直す
    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), InfraError>;

    /// メッセージを削除する（ack）
    async fn delete(&self, receipt_handle: &str) -> Result<(), InfraError>;
}

/// Amazon SQS によるメッセージキュー
pub struct SqsMessageQueue {
    client:             Client,
    queue_url:          String,
    visibility_timeout: Option<Duration>,
}

impl SqsMessageQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            visibility_timeout: None,
        }
    }

    /// 受信時に可視性タイムアウトを指定する。未指定ならキューの既定値に従う
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    #[tracing::instrument(skip_all, level = "debug", fields(queue_url = %self.queue_url))]
    async fn publish(&self, body: &str) -> Result<String, InfraError> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| InfraError::queue(format!("SendMessage 失敗: {}", DisplayErrorContext(&e))))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, InfraError> {
        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH) as i32;
        let wait_seconds = wait.as_secs().min(20) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .set_visibility_timeout(self.visibility_timeout.map(visibility_seconds))
            .send()
            .await
            .map_err(|e| {
                InfraError::queue(format!("ReceiveMessage 失敗: {}", DisplayErrorContext(&e)))
            })?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|m| {
                let Some(receipt_handle) = m.receipt_handle() else {
                    tracing::warn!(message_id = ?m.message_id(), "receipt handle のないメッセージを無視");
                    return None;
                };
                Some(ReceivedMessage {
                    message_id:     m.message_id().unwrap_or_default().to_string(),
                    receipt_handle: receipt_handle.to_string(),
                    body:           m.body().unwrap_or_default().to_string(),
                })
            })
            .collect();

        Ok(messages)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(queue_url = %self.queue_url))]
    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), InfraError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(visibility_seconds(timeout))
            .send()
            .await
            .map_err(|e| {
                InfraError::queue(format!(
                    "ChangeMessageVisibility 失敗: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(queue_url = %self.queue_url))]
    async fn delete(&self, receipt_handle: &str) -> Result<(), InfraError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                InfraError::queue(format!("DeleteMessage 失敗: {}", DisplayErrorContext(&e)))
            })?;

        Ok(())
    }
}

/// SQS クライアントを作成する
///
/// # 引数
///
/// * `region` - AWS リージョン
/// * `endpoint` - エンドポイント URL（ElasticMQ 等）。`None` なら AWS の既定
pub async fn create_client(region: &str, endpoint: Option<&str>) -> Client {
    let mut config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()));

    if let Some(endpoint_url) = endpoint {
        config_builder = config_builder.endpoint_url(endpoint_url);
    }

    let config = config_builder.load().await;
    Client::new(&config)
}
