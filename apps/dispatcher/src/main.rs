//! # Dispatcher プロセス
//!
//! スケジューラ・キャンペーナー・センダーの 3 ステージを 1 プロセスで起動する。
//!
//! ```text
//! ┌───────────┐  dispatch  ┌────────────┐  delivery  ┌──────────┐
//! │ Scheduler │──queue────▶│ Campaigner │──queue────▶│  Sender  │──▶ SES / SMTP
//! └───────────┘            └────────────┘            └──────────┘
//!       │                        │                        │
//!       └────────── PostgreSQL ──┴──────── Redis ─────────┘
//! ```
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `REDIS_URL` | **Yes** | Redis 接続 URL（重複排除キャッシュ） |
//! | `DISPATCH_QUEUE_URL` | **Yes** | ディスパッチキューの URL |
//! | `DELIVERY_QUEUE_URL` | **Yes** | 配信キューの URL |
//! | `SQS_ENDPOINT_URL` | No | SQS エンドポイント（ElasticMQ 等） |
//! | `AWS_REGION` | No | AWS リージョン（デフォルト: `ap-northeast-1`） |
//! | `SCHEDULER_INTERVAL_SECS` | No | スケジューラの実行間隔（デフォルト: 60） |
//! | `CAMPAIGNER_WORKERS` | No | キャンペーナーのワーカー数（デフォルト: 10） |
//! | `SENDER_WORKERS` | No | センダーのワーカー数（デフォルト: 50） |
//! | `SUBSCRIBER_PAGE_SIZE` | No | 購読者のページサイズ（デフォルト: 1000） |
//! | `VISIBILITY_EXTENSION_SECS` | No | 可視性タイムアウトの延長幅（デフォルト: 300） |
//! | `DEDUP_TTL_SECS` | No | 重複排除キーの有効期限（デフォルト: 3 日） |
//! | `EMAIL_PROVIDER` | No | `ses` / `smtp` / `noop`（デフォルト: `ses`） |
//! | `SMTP_HOST` / `SMTP_PORT` | No | SMTP 送信先（デフォルト: `localhost:1025`） |
//! | `LOG_FORMAT` | No | `json` / `pretty` |
//!
//! ## 起動方法
//!
//! ```bash
//! EMAIL_PROVIDER=smtp cargo run -p mailcast-dispatcher
//! ```
//!
//! SIGINT / SIGTERM を受けるとポーリングを止め、処理中のメッセージを終えてから終了する。

use std::sync::Arc;

use mailcast_dispatcher::{
    config::{DispatcherConfig, EmailProviderKind},
    usecase::{Campaigner, CampaignerSettings, Scheduler, Sender},
    worker::QueueConsumer,
};
use mailcast_domain::clock::{Clock, SystemClock};
use mailcast_infra::{
    cache::RedisDedupCache,
    db,
    provider::{EmailProvider, NoopEmailProvider, SesEmailProvider, SmtpEmailProvider},
    queue::{self, MessageQueue, SqsMessageQueue},
    repository::{
        PostgresCampaignRepository,
        PostgresScheduleRepository,
        PostgresSegmentRepository,
        PostgresSendLogRepository,
        PostgresSubscriberRepository,
        PostgresTemplateRepository,
        PostgresUserRepository,
    },
    template::TeraTemplateRenderer,
};
use mailcast_shared::observability::{TracingConfig, init_tracing};
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "mailcast-dispatcher";

/// データベース接続プールの上限
const DATABASE_MAX_CONNECTIONS: u32 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let config = DispatcherConfig::from_env()?;
    init_tracing(TracingConfig::new(SERVICE_NAME, config.log_format));

    tracing::info!(
        provider = ?config.email_provider,
        campaigner_workers = config.campaigner_workers,
        sender_workers = config.sender_workers,
        "Dispatcher を起動します"
    );

    let pool = db::create_pool(&config.database_url, DATABASE_MAX_CONNECTIONS).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("データベースに接続しました");

    let cache = Arc::new(RedisDedupCache::new(&config.redis_url).await?);
    tracing::info!("Redis に接続しました");

    let sqs = queue::create_client(&config.aws_region, config.sqs_endpoint_url.as_deref()).await;
    let dispatch_queue: Arc<dyn MessageQueue> =
        Arc::new(
            SqsMessageQueue::new(sqs.clone(), &config.dispatch_queue_url)
                .with_visibility_timeout(config.visibility_extension),
        );
    let delivery_queue: Arc<dyn MessageQueue> =
        Arc::new(SqsMessageQueue::new(sqs, &config.delivery_queue_url));

    let provider: Arc<dyn EmailProvider> = match config.email_provider {
        EmailProviderKind::Ses => Arc::new(SesEmailProvider::new()),
        EmailProviderKind::Smtp => {
            Arc::new(SmtpEmailProvider::new(&config.smtp_host, config.smtp_port))
        }
        EmailProviderKind::Noop => Arc::new(NoopEmailProvider),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let campaigns = Arc::new(PostgresCampaignRepository::new(pool.clone()));
    let templates = Arc::new(PostgresTemplateRepository::new(pool.clone()));
    let send_logs = Arc::new(PostgresSendLogRepository::new(pool.clone()));

    let scheduler = Scheduler::new(
        Arc::new(PostgresScheduleRepository::new(pool.clone())),
        campaigns.clone(),
        templates.clone(),
        Arc::new(PostgresSegmentRepository::new(pool.clone())),
        Arc::new(PostgresUserRepository::new(pool.clone())),
        dispatch_queue.clone(),
        clock.clone(),
    );
    let campaigner = Campaigner::new(
        campaigns,
        templates,
        Arc::new(PostgresSubscriberRepository::new(pool)),
        send_logs.clone(),
        Arc::new(TeraTemplateRenderer::new()),
        dispatch_queue.clone(),
        delivery_queue.clone(),
        clock.clone(),
        CampaignerSettings {
            page_size:            config.subscriber_page_size,
            visibility_extension: config.visibility_extension,
            extend_interval:      config.extend_interval(),
        },
    );
    let sender = Sender::new(cache, provider, send_logs, clock, config.dedup_ttl);

    let shutdown = CancellationToken::new();
    let scheduler_task = {
        let shutdown = shutdown.clone();
        let interval = config.scheduler_interval;
        tokio::spawn(async move { scheduler.run(interval, shutdown).await })
    };
    let campaigner_task = tokio::spawn(
        QueueConsumer::new(
            "campaigner",
            dispatch_queue,
            Arc::new(campaigner),
            config.campaigner_workers,
        )
        .run(shutdown.clone()),
    );
    let sender_task = tokio::spawn(
        QueueConsumer::new(
            "sender",
            delivery_queue,
            Arc::new(sender),
            config.sender_workers,
        )
        .run(shutdown.clone()),
    );

    wait_for_signal().await?;
    tracing::info!("停止シグナルを受信しました。処理中のメッセージを終えてから終了します");
    shutdown.cancel();

    let (scheduler_result, campaigner_result, sender_result) =
        tokio::join!(scheduler_task, campaigner_task, sender_task);
    scheduler_result?;
    campaigner_result?;
    sender_result?;

    tracing::info!("Dispatcher を停止しました");
    Ok(())
}

/// SIGINT または SIGTERM を待つ
#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
