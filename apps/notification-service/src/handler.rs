//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置
//! - 親モジュール（この `handler.rs`）で re-export し、フラットな API を提供
//! - ハンドラは薄く保ち、ロジックはユースケースに委譲

pub mod health;
pub mod message;
pub mod notify;
pub mod registration;

pub use health::{ReadinessState, health_check, readiness_check};
pub use message::{MessageState, get_message};
pub use notify::{
    CLIENT_ID_HEADER,
    NotifyState,
    notify_email,
    notify_everyone,
    notify_organization,
    notify_space,
    notify_uaa_scope,
    notify_user,
};
pub use registration::{RegistrationState, register_notifications};
