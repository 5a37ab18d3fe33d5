//! # テンプレート解決
//!
//! 通知 1 回分の件名・テキスト・HTML テンプレートを決定する。
//!
//! ## 解決順序
//!
//! 1. 種別（なければクライアント）に割り当てられたテンプレートが DB にあればそれを使う
//! 2. なければファイルテンプレートを使う。ファイル名は件名の有無と本文の系統で決まる
//!
//! | 件名 | 本文の系統 | 件名テンプレート | 本文テンプレート |
//! |-----|-----------|----------------|----------------|
//! | あり | User | `subject.provided` | `user_body.text` / `user_body.html` |
//! | なし | User | `subject.missing` | `user_body.text` / `user_body.html` |
//! | あり | Space | `subject.provided` | `space_body.text` / `space_body.html` |
//! | なし | Space | `subject.missing` | `space_body.text` / `space_body.html` |
//!
//! 各ファイルは上書きディレクトリを先に確認する（[`TemplateStore`] の責務）。
//! 読み込みはリクエストごとに行い、キャッシュしない。

use std::sync::Arc;

use notifyd_domain::{
    client::TemplateId,
    notification::{BodyKind, Templates},
};
use notifyd_infra::{repository::TemplateRepository, template_store::TemplateStore};

use crate::error::NotifyError;

/// ファイルテンプレート名の組
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateNames {
    pub subject: &'static str,
    pub text:    &'static str,
    pub html:    &'static str,
}

impl TemplateNames {
    /// 件名の有無と本文の系統からファイル名を決める
    pub fn select(subject_provided: bool, body: BodyKind) -> Self {
        let subject = if subject_provided {
            "subject.provided"
        } else {
            "subject.missing"
        };
        let (text, html) = match body {
            BodyKind::Space => ("space_body.text", "space_body.html"),
            BodyKind::User => ("user_body.text", "user_body.html"),
        };
        Self {
            subject,
            text,
            html,
        }
    }
}

/// テンプレートローダー
pub struct TemplateLoader {
    store:     Arc<dyn TemplateStore>,
    templates: Arc<dyn TemplateRepository>,
}

impl TemplateLoader {
    pub fn new(store: Arc<dyn TemplateStore>, templates: Arc<dyn TemplateRepository>) -> Self {
        Self { store, templates }
    }

    /// 通知 1 回分のテンプレートを読み込む
    ///
    /// `assigned` は種別またはクライアントに割り当てられたテンプレート ID。
    /// 割り当てが DB に存在しない場合はファイルテンプレートに戻る。
    #[tracing::instrument(skip_all, level = "debug", fields(assigned = ?assigned))]
    pub async fn load(
        &self,
        assigned: Option<&TemplateId>,
        subject_provided: bool,
        body: BodyKind,
    ) -> Result<Templates, NotifyError> {
        if let Some(id) = assigned {
            match self.templates.find_by_id(id).await? {
                Some(template) => {
                    tracing::debug!(template_id = %id, "割り当てテンプレートを使用します");
                    return Ok(Templates {
                        subject: template.subject,
                        text:    template.text,
                        html:    template.html,
                    });
                }
                None => {
                    tracing::warn!(
                        template_id = %id,
                        "割り当てテンプレートが見つからないためファイルテンプレートを使用します"
                    );
                }
            }
        }

        self.load_files(subject_provided, body).await
    }

    /// ファイルテンプレートを読み込む
    pub async fn load_files(
        &self,
        subject_provided: bool,
        body: BodyKind,
    ) -> Result<Templates, NotifyError> {
        let names = TemplateNames::select(subject_provided, body);
        let (subject, text, html) = tokio::try_join!(
            self.store.load(names.subject),
            self.store.load(names.text),
            self.store.load(names.html),
        )?;

        Ok(Templates {
            subject,
            text,
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use notifyd_domain::client::Template;
    use notifyd_infra::mock::{MockTemplateRepository, MockTemplateStore};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn setup() -> (MockTemplateStore, MockTemplateRepository, TemplateLoader) {
        let store = MockTemplateStore::with_defaults();
        let repo = MockTemplateRepository::new();
        let loader = TemplateLoader::new(Arc::new(store.clone()), Arc::new(repo.clone()));
        (store, repo, loader)
    }

    #[rstest]
    #[case(true, BodyKind::User, "subject.provided", "user_body.text", "user_body.html")]
    #[case(false, BodyKind::User, "subject.missing", "user_body.text", "user_body.html")]
    #[case(true, BodyKind::Space, "subject.provided", "space_body.text", "space_body.html")]
    #[case(false, BodyKind::Space, "subject.missing", "space_body.text", "space_body.html")]
    fn test_件名の有無と本文の系統でファイル名が決まる(
        #[case] subject_provided: bool,
        #[case] body: BodyKind,
        #[case] subject: &str,
        #[case] text: &str,
        #[case] html: &str,
    ) {
        let names = TemplateNames::select(subject_provided, body);

        assert_eq!((names.subject, names.text, names.html), (subject, text, html));
    }

    #[tokio::test]
    async fn test_割り当てがなければファイルテンプレートを読み込む() {
        let (store, _repo, loader) = setup();
        store.set("space_body.text", "space text");

        let templates = loader.load(None, false, BodyKind::Space).await.unwrap();

        assert_eq!(templates.text, "space text");
        assert_eq!(
            templates.subject,
            "{{ source_description }}: {{ kind_description }}"
        );
    }

    #[rstest]
    #[case("subject.provided")]
    #[case("subject.missing")]
    #[case("user_body.text")]
    #[case("user_body.html")]
    #[case("space_body.text")]
    #[case("space_body.html")]
    #[tokio::test]
    async fn test_上書きされた内容がそのまま使われる(#[case] name: &str) {
        let (store, _repo, loader) = setup();
        store.set(name, "OVERRIDE");
        let (subject_provided, body) = match name {
            "subject.provided" => (true, BodyKind::User),
            n if n.starts_with("space") => (false, BodyKind::Space),
            _ => (false, BodyKind::User),
        };

        let templates = loader.load(None, subject_provided, body).await.unwrap();

        let loaded = [templates.subject, templates.text, templates.html];
        assert_eq!(loaded.iter().filter(|t| *t == "OVERRIDE").count(), 1);
    }

    #[tokio::test]
    async fn test_割り当てテンプレートがあればファイルより優先する() {
        let (_store, repo, loader) = setup();
        let id = TemplateId::new("tpl-1").unwrap();
        repo.add_template(Template {
            id:      id.clone(),
            name:    "custom".to_string(),
            subject: "custom subject".to_string(),
            text:    "custom text".to_string(),
            html:    "<p>custom</p>".to_string(),
        });

        let templates = loader.load(Some(&id), false, BodyKind::User).await.unwrap();

        assert_eq!(
            templates,
            Templates {
                subject: "custom subject".to_string(),
                text:    "custom text".to_string(),
                html:    "<p>custom</p>".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_割り当てが存在しなければファイルテンプレートに戻る() {
        let (_store, _repo, loader) = setup();
        let id = TemplateId::new("deleted").unwrap();

        let templates = loader.load(Some(&id), true, BodyKind::User).await.unwrap();

        assert_eq!(templates.subject, "{{ subject }}");
    }

    #[tokio::test]
    async fn test_テンプレートが読み込めなければtemplate_loadエラーになる() {
        let (store, _repo, loader) = setup();
        store.remove("user_body.html");

        let result = loader.load(None, true, BodyKind::User).await;

        assert!(matches!(
            result,
            Err(NotifyError::TemplateLoad(e)) if e.name == "user_body.html"
        ));
    }
}
