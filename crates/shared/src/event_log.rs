//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! 配信パイプラインの追跡を `jq` で行えるよう、ログフィールドの命名規約と
//! ヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! `tracing::error!` / `tracing::warn!` に `error.category` + `error.kind` フィールドを直接追加する。
//! 定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: エンティティ種別（[`event::entity_type`] の定数を使用）
/// - `event.entity_id`: エンティティ ID
/// - `event.client_id`: 通知を依頼したクライアント
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const NOTIFICATION: &str = "notification";
        pub const QUEUE: &str = "queue";
        pub const REGISTRATION: &str = "registration";
        pub const MAINTENANCE: &str = "maintenance";
    }

    /// イベントアクション
    pub mod action {
        // 受付
        pub const NOTIFICATION_QUEUED: &str = "notification.queued";

        // 配信
        pub const NOTIFICATION_DELIVERED: &str = "notification.delivered";
        pub const NOTIFICATION_UNAVAILABLE: &str = "notification.unavailable";
        pub const NOTIFICATION_FAILED: &str = "notification.failed";
        pub const NOTIFICATION_SKIPPED: &str = "notification.skipped";

        // キュー
        pub const JOB_RETRY_SCHEDULED: &str = "job.retry_scheduled";
        pub const JOB_EXHAUSTED: &str = "job.exhausted";
        pub const JOBS_UNLOCKED: &str = "job.unlocked";

        // 登録
        pub const CLIENT_REGISTERED: &str = "client.registered";

        // メンテナンス
        pub const MESSAGES_PURGED: &str = "messages.purged";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const MESSAGE: &str = "message";
        pub const JOB: &str = "job";
        pub const CLIENT: &str = "client";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB、テンプレートファイル）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部サービス呼び出し（ディレクトリ、メール送信経路）
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const QUEUE: &str = "queue";
        pub const DIRECTORY: &str = "directory";
        pub const MAIL_TRANSPORT: &str = "mail_transport";
        pub const TEMPLATE: &str = "template";
        pub const PAYLOAD: &str = "payload";
        pub const INTERNAL: &str = "internal";
    }
}
