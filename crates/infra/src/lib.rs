//! # notifyd インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! ドメイン層の型を受け取り、外部システムの詳細（SQL、HTTP、SMTP、ファイル）を
//! カプセル化する。ユースケースは各モジュールの trait に依存し、
//! テストでは [`mock`] のインメモリ実装に差し替える。
//!
//! ## 依存関係
//!
//! ```text
//! notification-service → infra → domain
//!          ↘                 ↘
//!            shared
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL 接続プール、マイグレーション、トランザクション
//! - [`queue`] - 永続ジョブキュー
//! - [`repository`] - リポジトリ実装
//! - [`directory`] - ユーザー・組織ディレクトリのクライアント
//! - [`notification`] - メール送信
//! - [`template_store`] - テンプレートファイルの読み込み
//! - [`error`] - インフラ層エラー定義
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use notifyd_infra::{db, queue::{PostgresJobQueue, QueueSettings}};
//!
//! let pool = db::create_pool("postgres://localhost/notifyd", 20).await?;
//! db::run_migrations(&pool).await?;
//! let queue = PostgresJobQueue::new(pool.clone(), clock, QueueSettings::default());
//! ```

pub mod db;
pub mod directory;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod queue;
pub mod repository;
pub mod template_store;

pub use db::{PgTransactionManager, TransactionManager, TxContext};
pub use error::InfraError;
