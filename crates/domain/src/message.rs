//! # 配信結果（メッセージ）
//!
//! ワーカーが送信を試みた結果をメッセージ ID 単位で記録する。
//! 保持期間を過ぎたレコードはメッセージ GC が削除する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notification::MessageId;

/// 配信結果のステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    /// 送信成功
    Delivered,
    /// 送信経路に到達できなかった（リトライ対象）
    Unavailable,
    /// メッセージが拒否された、またはレンダリングできなかった
    Failed,
    /// 配信停止中のため送信しなかった
    Unsubscribed,
}

/// 配信結果レコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id:         MessageId,
    pub status:     MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_message_statusはdb表現と相互変換できる() {
        let s: &str = MessageStatus::Unavailable.into();
        assert_eq!(s, "unavailable");
        assert_eq!(MessageStatus::from_str("delivered").unwrap(), MessageStatus::Delivered);
    }
}
