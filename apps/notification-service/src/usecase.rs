//! # ユースケース層
//!
//! 通知の受付から配信結果の記録までのロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリ・キュー・外部サービスを `Arc<dyn Trait>` で外部から注入
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//! - **同期処理はエンキューまで**: 送信はワーカーが非同期に行う
//!
//! ## モジュール構成
//!
//! - `strategy`: 宛先指定と宛先解決
//! - `template_loader`: テンプレート解決
//! - `mailer`: 配信レコードのエンキュー
//! - `notify`: 通知の受付
//! - `registrar`: クライアントと通知種別の登録
//! - `renderer`: メッセージの組み立て
//! - `delivery_worker`: 配信ワーカー
//! - `message_gc`: 配信結果の削除

pub mod delivery_worker;
pub mod mailer;
pub mod message_gc;
pub mod notify;
pub mod registrar;
pub mod renderer;
pub mod strategy;
pub mod template_loader;

pub use delivery_worker::{DeliveryWorker, ProcessOutcome};
pub use mailer::{Envelope, Mailer};
pub use message_gc::MessageGc;
pub use notify::{NotifyInput, NotifyUseCase};
pub use registrar::{KindRegistration, Registration, RegistrarUseCase, RegistrationInput};
pub use renderer::MessageRenderer;
pub use strategy::{AddressingTarget, Audience, Recipient, RecipientResolver};
pub use template_loader::{TemplateLoader, TemplateNames};
