//! # リポジトリ実装
//!
//! 通知配信で扱う永続データへのアクセスを提供する。
//!
//! ## 設計方針
//!
//! - **trait + PostgreSQL 実装**: ユースケースは trait に依存し、テストではモックに差し替える
//! - **トランザクションの明示**: エンキューと同じトランザクションに乗せる操作は
//!   [`TxContext`](crate::db::TxContext) を引数に取る
//! - **冪等な書き込み**: 登録と受信記録は `ON CONFLICT` で重複を吸収する

pub mod client_repository;
pub mod kind_repository;
pub mod message_repository;
pub mod receipt_repository;
pub mod template_repository;
pub mod unsubscribe_repository;

pub use client_repository::{ClientRepository, PostgresClientRepository};
pub use kind_repository::{KindRepository, PostgresKindRepository};
pub use message_repository::{MessageRepository, PostgresMessageRepository};
pub use receipt_repository::{PostgresReceiptRepository, ReceiptRepository};
pub use template_repository::{PostgresTemplateRepository, TemplateRepository};
pub use unsubscribe_repository::{PostgresUnsubscribeRepository, UnsubscribeRepository};
