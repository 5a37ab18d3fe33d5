//! # Notification Service ライブラリ
//!
//! 通知受付 API、配信ワーカー、メッセージ GC を公開する。
//! バイナリ（`main.rs`）と結合テストの両方から利用する。

pub mod app_builder;
pub mod config;
pub mod error;
pub mod handler;
pub mod usecase;

// テストユーティリティ（内部実装、ドキュメントからは隠す）
#[cfg(feature = "test-utils")]
#[doc(hidden)]
pub mod test_utils;
