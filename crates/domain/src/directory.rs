//! # ディレクトリ由来の型
//!
//! ユーザーディレクトリ（ID → メールアドレス、スコープ所属）と
//! 組織ディレクトリ（スペース・組織の所属とメタデータ）から得られる値を表現する。

use serde::{Deserialize, Serialize};

define_string_id! {
    /// ユーザー GUID
    ///
    /// ユーザーディレクトリが払い出す識別子。
    pub struct UserGuid {
        label: "ユーザー GUID",
    }
}

/// ディレクトリで解決されたユーザー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub guid:   UserGuid,
    /// 登録済みメールアドレス（0 件以上）
    pub emails: Vec<String>,
}

impl Identity {
    /// 送信先として使うメールアドレス（先頭の空でないもの）
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .map(|e| e.trim())
            .find(|e| !e.is_empty())
    }
}

/// スペース
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub guid:              String,
    pub name:              String,
    pub organization_guid: String,
}

/// 組織
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub guid: String,
    pub name: String,
}

/// 組織内ロールによる宛先の絞り込み
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum OrgRole {
    OrgManager,
    OrgAuditor,
    BillingManager,
}
