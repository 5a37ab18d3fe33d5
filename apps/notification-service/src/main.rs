//! # Notification Service サーバー
//!
//! マルチテナントの通知配信サービス。
//!
//! ## 役割
//!
//! - **受付**: 宛先指定（ユーザー・スペース・組織・全員・スコープ・メール）ごとに
//!   受信者を解決し、1 受信者 1 ジョブとしてキューに積む
//! - **配信**: ワーカープールがキューからジョブを予約し、メールを送信する
//! - **保守**: 保持期間を過ぎた配信結果を定期的に削除する
//!
//! ```text
//! ┌──────────┐  POST  ┌──────────────┐ enqueue ┌──────────┐ reserve ┌──────────────┐  SMTP
//! │  Client  │───────▶│  HTTP (axum) │────────▶│   jobs   │────────▶│ DeliveryPool │──────▶
//! └──────────┘        └──────────────┘         └──────────┘         └──────────────┘
//! ```
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `NOTIFY_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `NOTIFY_PORT` | **Yes** | ポート番号 |
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `ROOT_PATH` | No | `templates/` を含むディレクトリ（デフォルト: `.`） |
//! | `SENDER` | **Yes** | From アドレス |
//! | `NOTIFICATION_BACKEND` | No | `smtp` / `noop`（デフォルト: `smtp`） |
//! | `SMTP_HOST` / `SMTP_PORT` | No | SMTP リレー（デフォルト: `localhost:1025`） |
//! | `SMTP_USER` / `SMTP_PASS` / `SMTP_TLS` | No | SMTP 認証と STARTTLS |
//! | `UAA_HOST` / `UAA_CLIENT_ID` / `UAA_CLIENT_SECRET` | **Yes** | ユーザーディレクトリ |
//! | `CC_HOST` | **Yes** | 組織ディレクトリ |
//! | `INSTANCE_INDEX` | No | 0 がリーダー（マイグレーションと unlock を実行） |
//! | `WORKER_COUNT` | No | 配信ワーカー数（デフォルト: 10） |
//! | `JOB_*` | No | リトライ・リース・予約待ちの設定 |
//! | `MESSAGE_GC_INTERVAL_SECS` / `MESSAGE_RETENTION_SECS` | No | 配信結果の GC |
//! | `LOG_FORMAT` | No | `json` / `pretty`（デフォルト: `pretty`） |
//!
//! ## 起動方法
//!
//! ```bash
//! NOTIFY_PORT=3003 DATABASE_URL=postgres://... SENDER=no-reply@example.com \
//!   UAA_HOST=... UAA_CLIENT_ID=... UAA_CLIENT_SECRET=... CC_HOST=... \
//!   cargo run -p notifyd-notification-service
//! ```

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use notifyd_domain::{
    clock::{Clock, SystemClock},
    job::WorkerId,
};
use notifyd_infra::{
    PgTransactionManager,
    TransactionManager,
    db,
    directory::{CloudControllerDirectory, OrgDirectory, UaaDirectory, UserDirectory},
    notification::{NoopNotificationSender, NotificationSender, SmtpNotificationSender},
    queue::{JobQueue, PostgresJobQueue},
    repository::{
        PostgresClientRepository,
        PostgresKindRepository,
        PostgresMessageRepository,
        PostgresReceiptRepository,
        PostgresTemplateRepository,
        PostgresUnsubscribeRepository,
    },
    template_store::FileTemplateStore,
};
use notifyd_notification_service::{
    app_builder::{AppStates, build_app},
    config::{NotificationBackend, NotifyConfig},
    handler::{MessageState, NotifyState, ReadinessState, RegistrationState},
    usecase::{
        DeliveryWorker,
        Mailer,
        MessageGc,
        MessageRenderer,
        NotifyUseCase,
        RecipientResolver,
        RegistrarUseCase,
        TemplateLoader,
    },
};
use notifyd_shared::{
    event_log::event,
    log_business_event,
    observability::{TracingConfig, init_tracing},
};
use tokio::{net::TcpListener, sync::watch};

/// ワーカー数に加えて HTTP リクエスト用に確保する接続数
const HTTP_CONNECTIONS: u32 = 10;

/// Notification Service サーバーのエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    // トレーシング初期化
    init_tracing(TracingConfig::from_env("notification-service"));

    // 設定読み込み
    let config = NotifyConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        "Notification Service サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    // データベース接続プールを作成
    let max_connections = u32::try_from(config.queue.worker_count)
        .unwrap_or(u32::MAX)
        .saturating_add(HTTP_CONNECTIONS);
    let pool = db::create_pool(&config.database_url, max_connections)
        .await
        .context("データベース接続に失敗しました")?;
    tracing::info!("データベースに接続しました");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = PostgresJobQueue::new(pool.clone(), Arc::clone(&clock), config.queue.settings());

    // リーダーのみ: マイグレーションと予約済みジョブの解放
    if config.is_leader() {
        db::run_migrations(&pool)
            .await
            .context("マイグレーションの実行に失敗しました")?;
        tracing::info!("マイグレーションを適用しました");

        let unlocked = queue
            .unlock()
            .await
            .context("予約済みジョブの解放に失敗しました")?;
        log_business_event!(
            event.category = event::category::QUEUE,
            event.action = event::action::JOBS_UNLOCKED,
            event.entity_type = event::entity_type::JOB,
            event.result = event::result::SUCCESS,
            unlocked,
            "前回の予約済みジョブを解放しました"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let waker_handle = tokio::spawn(queue.waker().run(shutdown_rx.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(queue);

    // 外部サービス
    let users: Arc<dyn UserDirectory> = Arc::new(
        UaaDirectory::new(
            &config.directory.uaa_host,
            &config.directory.uaa_client_id,
            &config.directory.uaa_client_secret,
        )
        .context("ユーザーディレクトリの初期化に失敗しました")?,
    );
    let orgs: Arc<dyn OrgDirectory> = Arc::new(
        CloudControllerDirectory::new(&config.directory.cc_host)
            .context("組織ディレクトリの初期化に失敗しました")?,
    );
    let sender: Arc<dyn NotificationSender> = match config.notification.backend {
        NotificationBackend::Smtp => Arc::new(
            SmtpNotificationSender::new(&config.notification.smtp)
                .context("SMTP 送信の初期化に失敗しました")?,
        ),
        NotificationBackend::Noop => {
            tracing::warn!("NOTIFICATION_BACKEND=noop: メールは送信されません");
            Arc::new(NoopNotificationSender)
        }
    };

    // リポジトリ
    let tx_manager: Arc<dyn TransactionManager> = Arc::new(PgTransactionManager::new(pool.clone()));
    let clients = Arc::new(PostgresClientRepository::new());
    let kinds = Arc::new(PostgresKindRepository::new());
    let messages = Arc::new(PostgresMessageRepository::new(pool.clone()));

    // 配信ワーカープール
    let renderer = MessageRenderer::new(&config.sender);
    let worker = DeliveryWorker::new(
        WorkerId::new(format!("{}-worker", config.instance_index))?,
        Arc::clone(&queue),
        messages.clone(),
        sender,
        renderer,
        Arc::clone(&clock),
        config.queue.reserve_wait,
    );
    let worker_handles =
        worker.spawn_pool(config.queue.worker_count, config.instance_index, &shutdown_rx)?;
    tracing::info!(count = worker_handles.len(), "配信ワーカーを起動しました");

    // メッセージ GC
    let gc = MessageGc::new(
        messages.clone(),
        Arc::clone(&clock),
        config.gc.retention,
        config.gc.interval,
    );
    let gc_handle = tokio::spawn(gc.run(shutdown_rx.clone()));

    // ユースケース
    let loader = TemplateLoader::new(
        Arc::new(FileTemplateStore::new(&config.root_path)),
        Arc::new(PostgresTemplateRepository::new(pool.clone())),
    );
    let mailer = Mailer::new(
        Arc::clone(&queue),
        Arc::new(PostgresUnsubscribeRepository::new()),
        Arc::new(PostgresReceiptRepository::new()),
    );
    let notify_usecase = NotifyUseCase::new(
        Arc::clone(&tx_manager),
        Arc::clone(&users),
        RecipientResolver::new(users, orgs),
        clients.clone(),
        kinds.clone(),
        loader,
        mailer,
    );
    let registrar = RegistrarUseCase::new(tx_manager, clients, kinds);

    let app = build_app(AppStates {
        readiness:    Arc::new(ReadinessState { pool }),
        notify:       Arc::new(NotifyState {
            usecase: notify_usecase,
        }),
        registration: Arc::new(RegistrationState { usecase: registrar }),
        message:      Arc::new(MessageState { messages }),
    });

    // サーバー起動
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("バインドアドレスが不正です")?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Notification Service サーバーが起動しました: {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // バックグラウンドタスクの終了を待つ
    for handle in worker_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "配信ワーカーが異常終了しました");
        }
    }
    if let Err(e) = gc_handle.await {
        tracing::error!(error = %e, "メッセージ GC が異常終了しました");
    }
    if let Err(e) = waker_handle.await {
        tracing::error!(error = %e, "キュー通知の購読が異常終了しました");
    }

    tracing::info!("Notification Service サーバーを停止しました");
    Ok(())
}

/// Ctrl+C を待ち、バックグラウンドタスクへ停止を伝える
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルの待ち受けに失敗しました");
    }
    tracing::info!("停止シグナルを受信しました");
    let _ = shutdown_tx.send(true);
}
