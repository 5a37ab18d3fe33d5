//! # notifyd ドメイン層
//!
//! 通知配信サービスの中核となる値とルールを定義する。
//!
//! ## 設計方針
//!
//! - **I/O を持たない**: DB・HTTP・メール送信はすべてインフラ層の責務
//! - **不変な配信レコード**: エンキュー後に変わらない値として [`notification::Delivery`] を扱う
//! - **純粋なリトライ方針**: バックオフ計算は時刻とジッタを引数で受け取る
//!
//! ## 依存関係の方向
//!
//! ```text
//! notification-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`client`] - クライアント、通知種別、テンプレート
//! - [`directory`] - ディレクトリで解決されるユーザー・スペース・組織
//! - [`notification`] - 通知オプション、配信レコード、受付結果
//! - [`job`] - 配信ジョブとリトライ方針
//! - [`message`] - 配信結果
//! - [`clock`] - 時刻の抽象化
//! - [`error`] - ドメインエラー

#[macro_use]
mod macros;

pub mod client;
pub mod clock;
pub mod directory;
pub mod error;
pub mod job;
pub mod message;
pub mod notification;

pub use error::DomainError;
