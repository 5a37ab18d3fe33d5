//! テストハーネス
//!
//! インフラ層のモックを一式まとめ、ユースケース・ワーカー・ルーターを組み立てる。
//! 結合テスト（`tests/`）からの利用を想定する。
//!
//! # 使用例
//!
//! ```ignore
//! use notifyd_notification_service::test_utils::TestHarness;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     harness.users.add_user("user-1", &["one@example.com"]);
//!
//!     let responses = harness.notify_usecase().dispatch(...).await.unwrap();
//!     harness.drain().await;
//!
//!     assert_eq!(harness.sender.sent().len(), 1);
//! }
//! ```

use std::{sync::Arc, time::Duration as StdDuration};

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use notifyd_domain::{
    clock::ManualClock,
    job::{RetryPolicy, WorkerId},
};
use notifyd_infra::mock::{
    MockClientRepository,
    MockJobQueue,
    MockKindRepository,
    MockMessageRepository,
    MockNotificationSender,
    MockOrgDirectory,
    MockReceiptRepository,
    MockTemplateRepository,
    MockTemplateStore,
    MockTransactionManager,
    MockUnsubscribeRepository,
    MockUserDirectory,
};
use sqlx::postgres::PgPoolOptions;

use crate::{
    app_builder::{AppStates, build_app},
    handler::{MessageState, NotifyState, ReadinessState, RegistrationState},
    usecase::{
        DeliveryWorker,
        Mailer,
        MessageGc,
        MessageRenderer,
        NotifyUseCase,
        ProcessOutcome,
        RecipientResolver,
        RegistrarUseCase,
        TemplateLoader,
    },
};

/// テストで使う From アドレス
pub const SENDER: &str = "no-reply@example.com";

/// テストハーネス
///
/// 各モックは `Clone` で内部状態を共有するため、ユースケースに渡した後も
/// フィールド経由で状態を仕込んだり検証したりできる。
pub struct TestHarness {
    pub clock:        Arc<ManualClock>,
    pub queue:        MockJobQueue,
    pub clients:      MockClientRepository,
    pub kinds:        MockKindRepository,
    pub templates:    MockTemplateRepository,
    pub unsubscribes: MockUnsubscribeRepository,
    pub receipts:     MockReceiptRepository,
    pub messages:     MockMessageRepository,
    pub users:        MockUserDirectory,
    pub orgs:         MockOrgDirectory,
    pub sender:       MockNotificationSender,
    pub store:        MockTemplateStore,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// 2026-01-01T00:00:00Z 起点・デフォルトのリトライポリシーで構築する
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        let clock = Arc::new(ManualClock::new(Self::start()));
        Self {
            queue: MockJobQueue::with_clock(clock.clone(), policy),
            clock,
            clients: MockClientRepository::new(),
            kinds: MockKindRepository::new(),
            templates: MockTemplateRepository::new(),
            unsubscribes: MockUnsubscribeRepository::new(),
            receipts: MockReceiptRepository::new(),
            messages: MockMessageRepository::new(),
            users: MockUserDirectory::new(),
            orgs: MockOrgDirectory::new(),
            sender: MockNotificationSender::new(),
            store: MockTemplateStore::with_defaults(),
        }
    }

    /// ハーネスの起点時刻
    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    pub fn notify_usecase(&self) -> NotifyUseCase {
        let users = Arc::new(self.users.clone());
        NotifyUseCase::new(
            Arc::new(MockTransactionManager),
            users.clone(),
            RecipientResolver::new(users, Arc::new(self.orgs.clone())),
            Arc::new(self.clients.clone()),
            Arc::new(self.kinds.clone()),
            TemplateLoader::new(Arc::new(self.store.clone()), Arc::new(self.templates.clone())),
            Mailer::new(
                Arc::new(self.queue.clone()),
                Arc::new(self.unsubscribes.clone()),
                Arc::new(self.receipts.clone()),
            ),
        )
    }

    pub fn registrar(&self) -> RegistrarUseCase {
        RegistrarUseCase::new(
            Arc::new(MockTransactionManager),
            Arc::new(self.clients.clone()),
            Arc::new(self.kinds.clone()),
        )
    }

    pub fn worker(&self) -> DeliveryWorker {
        DeliveryWorker::new(
            WorkerId::new("0-worker-0").unwrap(),
            Arc::new(self.queue.clone()),
            Arc::new(self.messages.clone()),
            Arc::new(self.sender.clone()),
            MessageRenderer::new(SENDER),
            self.clock.clone(),
            StdDuration::from_millis(50),
        )
    }

    pub fn message_gc(&self, retention: chrono::Duration) -> MessageGc {
        MessageGc::new(
            Arc::new(self.messages.clone()),
            self.clock.clone(),
            retention,
            StdDuration::from_secs(60),
        )
    }

    /// モックで組み立てたルーター
    ///
    /// readiness 用のプールは接続しない（`/health/ready` は結合テストの対象外）。
    pub fn router(&self) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/notifyd_test")
            .expect("接続 URL が不正です");
        build_app(AppStates {
            readiness:    Arc::new(ReadinessState { pool }),
            notify:       Arc::new(NotifyState {
                usecase: self.notify_usecase(),
            }),
            registration: Arc::new(RegistrationState {
                usecase: self.registrar(),
            }),
            message:      Arc::new(MessageState {
                messages: Arc::new(self.messages.clone()),
            }),
        })
    }

    /// 今すぐ予約できるジョブがなくなるまで処理する
    pub async fn drain(&self) -> Vec<ProcessOutcome> {
        let worker = self.worker();
        let mut outcomes = Vec::new();
        while let Some(outcome) = worker.process_next().await.expect("ジョブ処理に失敗しました") {
            outcomes.push(outcome);
        }
        outcomes
    }
}
