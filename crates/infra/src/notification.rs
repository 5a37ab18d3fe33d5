//! # 通知送信
//!
//! レンダリング済みのメールをメール送信経路に渡すインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: `NotificationSender` trait でメール送信を抽象化
//! - **2 つの実装**: SMTP（本番・Mailpit 開発用）、Noop（送信無効化用）
//! - **環境変数切替**: `NOTIFICATION_BACKEND` でランタイム選択
//! - **失敗の分類**: 接続性の問題は [`NotificationError::Unavailable`]、
//!   サーバーに拒否されたものは [`NotificationError::Rejected`] として返す。
//!   ワーカーはこの区別を配信結果のステータスに反映する

mod noop;
mod smtp;

use async_trait::async_trait;
pub use noop::NoopNotificationSender;
use notifyd_domain::notification::{EmailMessage, NotificationError};
pub use smtp::{SmtpNotificationSender, SmtpSettings};

/// メール送信トレイト
///
/// 配信ワーカーはこの trait 越しにメールを送る。
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// メールを送信する
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError>;
}
