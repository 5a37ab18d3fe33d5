//! SMTP 通知送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//! 開発環境では Mailpit（ローカル SMTP サーバー）に接続する。

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{
        Mailbox,
        Message,
        MultiPart,
        SinglePart,
        header::{ContentType, HeaderName, HeaderValue},
    },
    transport::smtp::authentication::Credentials,
};
use notifyd_domain::notification::{EmailMessage, NotificationError};

use super::NotificationSender;

/// 呼び出し元クライアントを示すヘッダー
pub const CLIENT_ID_HEADER: &str = "X-Notify-Client-Id";

/// 通知 ID（メッセージ ID）を示すヘッダー
pub const NOTIFICATION_ID_HEADER: &str = "X-Notify-Notification-Id";

/// SMTP 接続設定
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host:     String,
    pub port:     u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// STARTTLS を使う
    pub tls:      bool,
}

/// SMTP 通知送信
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
pub struct SmtpNotificationSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotificationSender {
    /// 新しい SMTP 送信インスタンスを作成
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotificationError> {
        let builder = if settings.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| NotificationError::Unavailable(format!("TLS 設定に失敗: {e}")))?
        } else {
            // TLS なしで接続（Mailpit 等のローカル SMTP 向け）
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };
        let mut builder = builder.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn parse_mailbox(address: &str, label: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse()
        .map_err(|e| NotificationError::Rejected(format!("{label}アドレス不正: {e}")))
}

/// EmailMessage から送信用のメッセージを組み立てる
///
/// テキストと HTML の両方があれば `multipart/alternative`、片方だけなら単一パートにする。
pub(crate) fn build_message(email: &EmailMessage) -> Result<Message, NotificationError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&email.from, "送信元")?)
        .to(parse_mailbox(&email.to, "宛先")?)
        .subject(&email.subject)
        .raw_header(HeaderValue::new(
            HeaderName::new_from_ascii_str(CLIENT_ID_HEADER),
            email.client_id.clone(),
        ))
        .raw_header(HeaderValue::new(
            HeaderName::new_from_ascii_str(NOTIFICATION_ID_HEADER),
            email.message_id.clone(),
        ));
    if let Some(reply_to) = email.reply_to.as_deref().filter(|r| !r.trim().is_empty()) {
        builder = builder.reply_to(parse_mailbox(reply_to, "返信先")?);
    }

    let text = SinglePart::builder()
        .header(ContentType::TEXT_PLAIN)
        .body(email.text_body.clone());
    let html = SinglePart::builder()
        .header(ContentType::TEXT_HTML)
        .body(email.html_body.clone());

    let message = match (email.text_body.is_empty(), email.html_body.is_empty()) {
        (false, false) => builder.multipart(MultiPart::alternative().singlepart(text).singlepart(html)),
        (true, false) => builder.singlepart(html),
        _ => builder.singlepart(text),
    };

    message.map_err(|e| NotificationError::Rejected(format!("メッセージ構築失敗: {e}")))
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let message = build_message(email)?;

        self.transport.send(message).await.map_err(|e| {
            if e.is_permanent() {
                NotificationError::Rejected(format!("SMTP サーバーが拒否しました: {e}"))
            } else {
                NotificationError::Unavailable(format!("SMTP 送信失敗: {e}"))
            }
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> EmailMessage {
        EmailMessage {
            from:       "no-reply@example.com".to_string(),
            to:         "user@example.com".to_string(),
            reply_to:   Some("support@example.com".to_string()),
            subject:    "Deploy finished".to_string(),
            text_body:  "done".to_string(),
            html_body:  "<p>done</p>".to_string(),
            client_id:  "deployer".to_string(),
            message_id: "3c1f3d8e-0000-4000-8000-000000000001".to_string(),
        }
    }

    fn formatted(email: &EmailMessage) -> String {
        String::from_utf8(build_message(email).unwrap().formatted()).unwrap()
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpNotificationSender>();
    }

    #[test]
    fn test_識別ヘッダーと返信先が付与される() {
        let raw = formatted(&email());

        assert!(raw.contains("X-Notify-Client-Id: deployer"));
        assert!(raw.contains("X-Notify-Notification-Id: 3c1f3d8e-0000-4000-8000-000000000001"));
        assert!(raw.contains("Reply-To: support@example.com"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_html本文が空ならテキストの単一パートになる() {
        let raw = formatted(&EmailMessage {
            html_body: String::new(),
            reply_to: None,
            ..email()
        });

        assert!(!raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(!raw.contains("Reply-To"));
    }

    #[test]
    fn test_テキスト本文が空ならhtmlの単一パートになる() {
        let raw = formatted(&EmailMessage {
            text_body: String::new(),
            ..email()
        });

        assert!(!raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_不正な宛先はrejectedになる() {
        let result = build_message(&EmailMessage {
            to: "not an address".to_string(),
            ..email()
        });

        assert!(matches!(result, Err(NotificationError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_接続できないsmtpサーバーはunavailableになる() {
        let sender = SmtpNotificationSender::new(&SmtpSettings {
            host:     "127.0.0.1".to_string(),
            port:     1,
            username: None,
            password: None,
            tls:      false,
        })
        .unwrap();

        let result = sender.send_email(&email()).await;

        assert!(matches!(result, Err(NotificationError::Unavailable(_))));
    }
}
