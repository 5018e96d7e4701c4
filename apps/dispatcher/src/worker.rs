//! # キューコンシューマ（ワーカープール）
//!
//! 1 本のキューを、1 つのロングポーリング読み取りタスクと N 個のワーカーで消費する。
//!
//! ```text
//!  MessageQueue ──receive──▶ reader ──mpsc(bounded)──▶ worker 1..N ──▶ MessageHandler
//!                                                          │
//!                                          Ack → delete / Retry → 何もしない（再配信待ち）
//! ```
//!
//! - ワーカーは共有の受信側を `Arc<tokio::sync::Mutex<_>>` 越しに取り合う
//! - チャネルが埋まると reader は送信で待つため、ワーカー数を超えて先読みしない
//! - キャンセルされると reader は即座にポーリングを止める。ワーカーは手元の
//!   メッセージを処理し終え、チャネルが空になった時点で終了する

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use mailcast_infra::queue::{MAX_RECEIVE_BATCH, MessageQueue, ReceivedMessage};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

/// 受信エラー時の待機時間
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// ロングポーリングの待機時間（SQS の上限）
const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(20);

/// ハンドラの処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// 処理完了。メッセージを削除する
    Ack,
    /// メッセージを残し、可視性タイムアウト後の再配信に任せる
    Retry,
}

/// 1 メッセージを処理するハンドラ
///
/// エラーは返さない。失敗の扱いは実装側で [`HandleOutcome`] に分類する。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> HandleOutcome;
}

/// キューコンシューマ
pub struct QueueConsumer {
    name:      &'static str,
    queue:     Arc<dyn MessageQueue>,
    handler:   Arc<dyn MessageHandler>,
    workers:   usize,
    wait_time: Duration,
}

impl QueueConsumer {
    pub fn new(
        name: &'static str,
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn MessageHandler>,
        workers: usize,
    ) -> Self {
        Self {
            name,
            queue,
            handler,
            workers: workers.max(1),
            wait_time: DEFAULT_WAIT_TIME,
        }
    }

    /// ロングポーリングの待機時間を変更する
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// キャンセルされ、全ワーカーが終了するまで消費を続ける
    pub async fn run(self, shutdown: CancellationToken) {
        let (tx, rx) = mpsc::channel::<ReceivedMessage>(self.workers);
        let rx = Arc::new(Mutex::new(rx));
        let mut tasks = JoinSet::new();

        tasks.spawn(read_loop(
            self.name,
            self.queue.clone(),
            tx,
            self.wait_time,
            shutdown,
        ));
        for index in 0..self.workers {
            tasks.spawn(work_loop(
                self.name,
                index,
                self.queue.clone(),
                self.handler.clone(),
                rx.clone(),
            ));
        }

        tracing::info!(consumer = self.name, workers = self.workers, "コンシューマを起動しました");

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(consumer = self.name, error = %e, "ワーカーが異常終了しました");
            }
        }

        tracing::info!(consumer = self.name, "コンシューマを停止しました");
    }
}

async fn read_loop(
    name: &'static str,
    queue: Arc<dyn MessageQueue>,
    tx: mpsc::Sender<ReceivedMessage>,
    wait_time: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = queue.receive(MAX_RECEIVE_BATCH, wait_time) => result,
        };

        let messages = match received {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(consumer = name, error = %e, "メッセージの受信に失敗しました");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => continue,
                }
            }
        };

        for message in messages {
            // 未処理のまま捨てたメッセージは可視性タイムアウト後に再配信される
            tokio::select! {
                _ = shutdown.cancelled() => return,
                sent = tx.send(message) => if sent.is_err() { return; },
            }
        }
    }
    tracing::debug!(consumer = name, "ポーリングを停止しました");
}

async fn work_loop(
    name: &'static str,
    index: usize,
    queue: Arc<dyn MessageQueue>,
    handler: Arc<dyn MessageHandler>,
    rx: Arc<Mutex<mpsc::Receiver<ReceivedMessage>>>,
) {
    loop {
        let message = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(message) = message else {
            break;
        };

        match handler.handle(&message).await {
            HandleOutcome::Ack => {
                if let Err(e) = queue.delete(&message.receipt_handle).await {
                    tracing::error!(
                        consumer = name,
                        message_id = %message.message_id,
                        error = %e,
                        "メッセージの削除に失敗しました"
                    );
                }
            }
            HandleOutcome::Retry => {
                tracing::debug!(
                    consumer = name,
                    message_id = %message.message_id,
                    "メッセージを再配信に回します"
                );
            }
        }
    }
    tracing::debug!(consumer = name, worker = index, "ワーカーを停止しました");
}
