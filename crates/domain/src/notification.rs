//! # 通知
//!
//! 通知リクエストから配信ジョブまでに流れる値を定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`Options`] | 通知オプション | 件名・本文・返信先など呼び出し元が指定する内容 |
//! | [`Templates`] | テンプレートセット | 件名・テキスト・HTML の 3 テンプレート |
//! | [`Delivery`] | 配信レコード | 1 宛先分の送信に必要なすべて。ジョブのペイロード |
//! | [`Response`] | 受付結果 | 宛先ごとの同期応答（queued / noaddress / notfound） |
//!
//! ## 設計方針
//!
//! - **不変な配信レコード**: `Delivery` はエンキュー時に確定し、リトライでも同じメッセージ ID を使う
//! - **購読状態の焼き込み**: 配信停止の判定はエンキュー時に行い、送信時には再評価しない

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    client::{ClientId, KindId},
    directory::UserGuid,
};

define_uuid_id! {
    /// メッセージ ID（通知 ID）
    ///
    /// エンキュー時に一度だけ生成するランダムなトークン。呼び出し元には
    /// `notification_id` として返し、配信結果の照会キーになる。
    pub struct MessageId;
    random
}

/// 通知送信エラー
///
/// メール送信経路の失敗を、接続性の問題とメッセージ自体の拒否に分けて表現する。
/// 前者はリトライで回復しうるが、後者は同じ内容を再送しても通らない可能性が高い。
#[derive(Debug, Error)]
pub enum NotificationError {
    /// 送信経路に到達できない（接続失敗、タイムアウト、一時エラー）
    #[error("メール送信経路が利用できません: {0}")]
    Unavailable(String),

    /// メッセージが拒否された（宛先不正、恒久エラー応答）
    #[error("メッセージが拒否されました: {0}")]
    Rejected(String),

    /// テンプレートレンダリングに失敗
    #[error("テンプレートレンダリングに失敗: {0}")]
    TemplateFailed(String),
}

impl NotificationError {
    /// 同じジョブを再試行する意味があるか
    ///
    /// レンダリング失敗はペイロードだけで決まるため再試行しない。
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::TemplateFailed(_))
    }
}

/// 本文テンプレートの系統
///
/// スペース宛てとユーザー宛てで本文テンプレートが異なる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Space,
    User,
}

/// 呼び出し元が指定する通知内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    pub kind_id:            Option<KindId>,
    pub kind_description:   String,
    pub source_description: String,
    pub subject:            Option<String>,
    pub text:               String,
    pub html:               String,
    pub reply_to:           Option<String>,
}

impl Options {
    /// 件名が指定されているか
    pub fn subject_provided(&self) -> bool {
        self.subject.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// 件名・テキスト・HTML のテンプレートセット
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templates {
    pub subject: String,
    pub text:    String,
    pub html:    String,
}

/// 配信レコード（ジョブのペイロード）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id:   MessageId,
    pub client_id:    ClientId,
    /// メールアドレス直接指定の場合は `None`
    pub user_guid:    Option<UserGuid>,
    pub email:        String,
    pub space:        Option<String>,
    pub organization: Option<String>,
    pub options:      Options,
    pub templates:    Templates,
    pub subscribed:   bool,
}

/// 宛先ごとの受付ステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResponseStatus {
    /// ジョブとしてエンキューされた
    Queued,
    /// ユーザーは存在するが送信可能なアドレスがない
    NoAddress,
    /// ディレクトリにユーザーが存在しない
    NotFound,
}

/// 宛先ごとの同期応答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status:          ResponseStatus,
    pub recipient:       String,
    /// キューに入らなかった宛先では空文字列
    pub notification_id: String,
}

impl Response {
    pub fn queued(recipient: impl Into<String>, message_id: &MessageId) -> Self {
        Self {
            status:          ResponseStatus::Queued,
            recipient:       recipient.into(),
            notification_id: message_id.to_string(),
        }
    }

    pub fn no_address(recipient: impl Into<String>) -> Self {
        Self {
            status:          ResponseStatus::NoAddress,
            recipient:       recipient.into(),
            notification_id: String::new(),
        }
    }

    pub fn not_found(recipient: impl Into<String>) -> Self {
        Self {
            status:          ResponseStatus::NotFound,
            recipient:       recipient.into(),
            notification_id: String::new(),
        }
    }
}

/// メールメッセージ
///
/// レンダリングの出力。NotificationSender に渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from:       String,
    pub to:         String,
    pub reply_to:   Option<String>,
    pub subject:    String,
    /// 空の場合はテキストパートを付けない
    pub text_body:  String,
    /// 空の場合は HTML パートを付けない
    pub html_body:  String,
    pub client_id:  String,
    pub message_id: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_レンダリング失敗だけは再試行しない() {
        assert!(NotificationError::Unavailable("timeout".to_string()).is_retryable());
        assert!(NotificationError::Rejected("550".to_string()).is_retryable());
        assert!(!NotificationError::TemplateFailed("unclosed".to_string()).is_retryable());
    }

    #[test]
    fn test_message_idは毎回異なる値を生成する() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn test_response_statusは小文字でシリアライズされる() {
        let json = serde_json::to_value(Response::no_address("user-1")).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "status": "noaddress",
                "recipient": "user-1",
                "notification_id": ""
            })
        );
    }

    #[test]
    fn test_queuedはメッセージidをnotification_idに入れる() {
        let id = MessageId::new();
        let response = Response::queued("user-1", &id);

        assert_eq!(response.status, ResponseStatus::Queued);
        assert_eq!(response.notification_id, id.to_string());
    }

    #[test]
    fn test_subject_providedは空白のみの件名を未指定とみなす() {
        let mut options = Options {
            kind_id:            None,
            kind_description:   String::new(),
            source_description: String::new(),
            subject:            Some("  ".to_string()),
            text:               "本文".to_string(),
            html:               String::new(),
            reply_to:           None,
        };
        assert!(!options.subject_provided());

        options.subject = Some("件名".to_string());
        assert!(options.subject_provided());
    }

    #[test]
    fn test_deliveryはjsonで往復できる() {
        let delivery = Delivery {
            message_id:   MessageId::new(),
            client_id:    ClientId::new("billing").unwrap(),
            user_guid:    Some(UserGuid::new("user-1").unwrap()),
            email:        "user@example.com".to_string(),
            space:        Some("dev".to_string()),
            organization: Some("acme".to_string()),
            options:      Options {
                kind_id:            Some(KindId::new("invoice").unwrap()),
                kind_description:   "請求書".to_string(),
                source_description: "Billing".to_string(),
                subject:            None,
                text:               "本文".to_string(),
                html:               "<p>本文</p>".to_string(),
                reply_to:           None,
            },
            templates:    Templates {
                subject: "{{ kind_description }}".to_string(),
                text:    "{{ text }}".to_string(),
                html:    "{{ html | safe }}".to_string(),
            },
            subscribed:   true,
        };

        let json = serde_json::to_value(&delivery).unwrap();
        let restored: Delivery = serde_json::from_value(json).unwrap();

        assert_eq!(restored, delivery);
    }
}
