//! # メッセージレンダラー
//!
//! 配信レコードに焼き込まれたテンプレートを tera で展開し、送信用の
//! [`EmailMessage`] を組み立てる。
//!
//! ## 設計方針
//!
//! - **テンプレートは配信レコードが持つ**: リクエスト時に解決済みのため、ワーカーは
//!   ファイルや DB を読まない。`Tera::one_off` でその場で展開する
//! - **HTML だけエスケープ**: HTML 本文は autoescape を有効にし、呼び出し元の `html` は
//!   テンプレート側で `| safe` を付けて埋め込む。件名とテキスト本文はエスケープしない
//! - **空の本文は省略**: 呼び出し元が `text` を指定しなければテキストパートを、
//!   `html` を指定しなければ HTML パートを作らない
//!
//! ## テンプレート変数
//!
//! `to`, `from`, `reply_to`, `subject`, `text`, `html`, `kind_id`, `kind_description`,
//! `source_description`, `user_guid`, `client_id`, `message_id`, `space`, `organization`

use notifyd_domain::notification::{Delivery, EmailMessage, NotificationError};
use tera::{Context, Tera};

/// メッセージレンダラー
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    sender: String,
}

impl MessageRenderer {
    /// `sender` は From に使うアドレス
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }

    /// 配信レコードからメールメッセージを生成する
    pub fn render(&self, delivery: &Delivery) -> Result<EmailMessage, NotificationError> {
        let context = self.context(delivery);
        let options = &delivery.options;

        let subject = render(&delivery.templates.subject, &context, false)?;
        let text_body = if options.text.is_empty() {
            String::new()
        } else {
            render(&delivery.templates.text, &context, false)?
        };
        let html_body = if options.html.is_empty() {
            String::new()
        } else {
            render(&delivery.templates.html, &context, true)?
        };

        Ok(EmailMessage {
            from: self.sender.clone(),
            to: delivery.email.clone(),
            reply_to: options.reply_to.clone(),
            subject: subject.trim().to_string(),
            text_body,
            html_body,
            client_id: delivery.client_id.to_string(),
            message_id: delivery.message_id.to_string(),
        })
    }

    fn context(&self, delivery: &Delivery) -> Context {
        let options = &delivery.options;

        let mut context = Context::new();
        context.insert("to", &delivery.email);
        context.insert("from", &self.sender);
        context.insert("reply_to", options.reply_to.as_deref().unwrap_or(""));
        context.insert("subject", options.subject.as_deref().unwrap_or(""));
        context.insert("text", &options.text);
        context.insert("html", &options.html);
        context.insert(
            "kind_id",
            options.kind_id.as_ref().map(|k| k.as_str()).unwrap_or(""),
        );
        context.insert("kind_description", &options.kind_description);
        context.insert("source_description", &options.source_description);
        context.insert(
            "user_guid",
            delivery.user_guid.as_ref().map(|g| g.as_str()).unwrap_or(""),
        );
        context.insert("client_id", delivery.client_id.as_str());
        context.insert("message_id", &delivery.message_id.to_string());
        context.insert("space", delivery.space.as_deref().unwrap_or(""));
        context.insert("organization", delivery.organization.as_deref().unwrap_or(""));
        context
    }
}

fn render(template: &str, context: &Context, autoescape: bool) -> Result<String, NotificationError> {
    Tera::one_off(template, context, autoescape)
        .map_err(|e| NotificationError::TemplateFailed(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use notifyd_domain::{
        client::{ClientId, KindId},
        directory::UserGuid,
        notification::{MessageId, Options, Templates},
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn delivery() -> Delivery {
        Delivery {
            message_id:   MessageId::new(),
            client_id:    ClientId::new("deployer").unwrap(),
            user_guid:    Some(UserGuid::new("user-1").unwrap()),
            email:        "dev@example.com".to_string(),
            space:        Some("dev".to_string()),
            organization: Some("acme".to_string()),
            options:      Options {
                kind_id:            Some(KindId::new("deploy.finished").unwrap()),
                kind_description:   "Deploy finished".to_string(),
                source_description: "Deployer".to_string(),
                subject:            None,
                text:               "build <42> passed".to_string(),
                html:               "<b>build 42 passed</b>".to_string(),
                reply_to:           Some("ops@example.com".to_string()),
            },
            templates:    Templates {
                subject: "{{ source_description }} notification: {{ kind_description }}"
                    .to_string(),
                text:    "[{{ organization }}/{{ space }}] {{ text }}".to_string(),
                html:    "<p>{{ space }} &amp; {{ text }}</p>{{ html | safe }}".to_string(),
            },
            subscribed:   true,
        }
    }

    #[test]
    fn test_テンプレート変数を展開する() {
        let delivery = delivery();

        let email = MessageRenderer::new("no-reply@example.com")
            .render(&delivery)
            .unwrap();

        assert_eq!(email.from, "no-reply@example.com");
        assert_eq!(email.to, "dev@example.com");
        assert_eq!(email.reply_to.as_deref(), Some("ops@example.com"));
        assert_eq!(email.subject, "Deployer notification: Deploy finished");
        assert_eq!(email.text_body, "[acme/dev] build <42> passed");
        assert_eq!(email.client_id, "deployer");
        assert_eq!(email.message_id, delivery.message_id.to_string());
    }

    #[test]
    fn test_html本文では呼び出し元のhtmlだけがエスケープされない() {
        let email = MessageRenderer::new("no-reply@example.com")
            .render(&delivery())
            .unwrap();

        assert_eq!(
            email.html_body,
            "<p>dev &amp; build &lt;42&gt; passed</p><b>build 42 passed</b>"
        );
    }

    #[test]
    fn test_未指定の本文はパートを作らない() {
        let mut delivery = delivery();
        delivery.options.html = String::new();

        let email = MessageRenderer::new("no-reply@example.com")
            .render(&delivery)
            .unwrap();

        assert!(email.html_body.is_empty());
        assert!(!email.text_body.is_empty());
    }

    #[test]
    fn test_メール宛てではuser_guidとスペースが空になる() {
        let mut delivery = delivery();
        delivery.user_guid = None;
        delivery.space = None;
        delivery.organization = None;
        delivery.templates.text = "[{{ user_guid }}|{{ space }}] {{ text }}".to_string();

        let email = MessageRenderer::new("no-reply@example.com")
            .render(&delivery)
            .unwrap();

        assert_eq!(email.text_body, "[|] build <42> passed");
    }

    #[test]
    fn test_壊れたテンプレートはtemplate_failedになる() {
        let mut delivery = delivery();
        delivery.templates.subject = "{{ unclosed".to_string();

        let result = MessageRenderer::new("no-reply@example.com").render(&delivery);

        assert!(matches!(result, Err(NotificationError::TemplateFailed(_))));
    }

    #[test]
    fn test_未定義の変数はtemplate_failedになる() {
        let mut delivery = delivery();
        delivery.templates.subject = "{{ nonexistent }}".to_string();

        let result = MessageRenderer::new("no-reply@example.com").render(&delivery);

        assert!(matches!(result, Err(NotificationError::TemplateFailed(_))));
    }
}
