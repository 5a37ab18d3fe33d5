//! # クライアントと通知種別
//!
//! 通知を送信する API 利用者（クライアント）と、クライアントが所有する通知種別（Kind）、
//! 種別やクライアントに割り当てられるテンプレートを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`Client`] | クライアント | 登録済みの API 利用者。表示名（source name）を持つ |
//! | [`Kind`] | 通知種別 | クライアントごとに一意な通知カテゴリ |
//! | [`Template`] | テンプレート | 件名・テキスト・HTML のプレースホルダ付き本文 |
//!
//! ## 設計方針
//!
//! - **初回登録で作成**: クライアントと種別は登録または初回通知時に作成される
//! - **テンプレート割り当て**: 種別 → クライアント → システムデフォルトの順で解決する

use serde::{Deserialize, Serialize};

use crate::DomainError;

define_string_id! {
    /// クライアント ID
    ///
    /// 認証レイヤーがトークンから取り出した client_id をそのまま使う。
    pub struct ClientId {
        label: "クライアント ID",
    }
}

define_string_id! {
    /// テンプレート ID
    pub struct TemplateId {
        label: "テンプレート ID",
    }
}

/// 通知種別 ID
///
/// クライアント内で一意。英数字と `_` `-` `.` のみ許可する。
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct KindId(String);

impl KindId {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::Validation("種別 ID は必須です".to_string()));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(DomainError::Validation(format!(
                "種別 ID には英数字と _ - . のみ使用できます: {value:?}"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// クライアント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id:          ClientId,
    /// 通知本文の「送信元」として表示される名前
    pub source_name: String,
    pub template_id: Option<TemplateId>,
}

/// 通知種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kind {
    pub id:          KindId,
    pub client_id:   ClientId,
    pub description: String,
    /// 重要通知フラグ（管理 API から設定される）
    pub critical:    bool,
    pub template_id: Option<TemplateId>,
}

impl Kind {
    /// 種別 → クライアントの順で割り当てテンプレートを解決する
    ///
    /// どちらも未設定の場合は `None`（システムデフォルトのファイルテンプレートを使う）。
    pub fn template_to_use<'a>(&'a self, client: &'a Client) -> Option<&'a TemplateId> {
        self.template_id.as_ref().or(client.template_id.as_ref())
    }
}

/// 登録済みテンプレート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id:      TemplateId,
    pub name:    String,
    pub subject: String,
    pub text:    String,
    pub html:    String,
}
