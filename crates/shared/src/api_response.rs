//! # API レスポンスエンベロープ
//!
//! 登録 API や配信結果照会 API の統一レスポンス形式 `{ "data": T }` を提供する。
//! 通知 API は受付結果の配列をそのまま返すため、このエンベロープを使わない。

use serde::{Deserialize, Serialize};

/// 統一レスポンス型
///
/// ```
/// use notifyd_shared::ApiResponse;
///
/// let response = ApiResponse::new("delivered");
/// assert_eq!(response.data, "delivered");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
