//! # ディレクトリサービスクライアント
//!
//! 宛先解決に使う 2 つの外部ディレクトリとの通信を担当する。
//!
//! - **ユーザーディレクトリ**（UAA）: ユーザー ID → メールアドレス、スコープ所属、全ユーザー
//! - **組織ディレクトリ**（Cloud Controller v2）: スペース・組織のメタデータと所属ユーザー
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: ユースケースは [`UserDirectory`] / [`OrgDirectory`] に依存する
//! - **トークンはリクエスト単位**: 通知 1 回につき 1 度 [`UserDirectory::client_token`]
//!   でトークンを取得し、そのリクエスト内のすべての呼び出しに渡す
//! - **エラーの 3 分類**: 到達不能（[`DirectoryError::Unavailable`]）、
//!   対象なし（[`DirectoryError::NotFound`]）、それ以外（[`DirectoryError::Unknown`]）。
//!   HTTP 層はこの区別をそのまま応答に反映する

mod cloud_controller;
mod uaa;

use std::fmt;

use async_trait::async_trait;
pub use cloud_controller::CloudControllerDirectory;
use notifyd_domain::directory::{Identity, OrgRole, Organization, Space, UserGuid};
use thiserror::Error;
pub use uaa::UaaDirectory;

/// ディレクトリ呼び出しのタイムアウト
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// ディレクトリ API のアクセストークン
///
/// ログに値が出ないよう `Debug` ではマスクする。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// ディレクトリ呼び出しのエラー
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// ディレクトリに到達できない（接続失敗、タイムアウト、5xx）
    #[error("ディレクトリサービスに到達できません: {0}")]
    Unavailable(String),

    /// 指定したスペースや組織が存在しない
    #[error("{entity} が見つかりません: {id}")]
    NotFound { entity: &'static str, id: String },

    /// その他の失敗
    #[error("ディレクトリサービスでエラーが発生しました: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        let unreachable = e.is_connect()
            || e.is_timeout()
            || e.status().is_some_and(|s| s.is_server_error());
        if unreachable {
            Self::Unavailable(e.to_string())
        } else {
            Self::Unknown(e.to_string())
        }
    }
}

/// ユーザーディレクトリ trait
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// クライアントクレデンシャルでアクセストークンを取得する
    async fn client_token(&self) -> Result<AccessToken, DirectoryError>;

    /// ID でユーザーを取得する
    ///
    /// 見つからなかった ID は結果に含まれない。
    async fn users_by_ids(
        &self,
        guids: &[UserGuid],
        token: &AccessToken,
    ) -> Result<Vec<Identity>, DirectoryError>;

    /// スコープ（グループ）に属するユーザー ID を取得する
    async fn user_guids_by_scope(
        &self,
        scope: &str,
        token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError>;

    /// 全ユーザーを取得する
    async fn all_users(&self, token: &AccessToken) -> Result<Vec<Identity>, DirectoryError>;
}

/// 組織ディレクトリ trait
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    /// スペースを取得する
    async fn space(&self, guid: &str, token: &AccessToken) -> Result<Space, DirectoryError>;

    /// 組織を取得する
    async fn organization(
        &self,
        guid: &str,
        token: &AccessToken,
    ) -> Result<Organization, DirectoryError>;

    /// スペースに所属するユーザー ID を取得する
    async fn space_user_guids(
        &self,
        guid: &str,
        token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError>;

    /// 組織に所属するユーザー ID を取得する（ロール指定時はそのロールのみ）
    async fn organization_user_guids(
        &self,
        guid: &str,
        role: Option<OrgRole>,
        token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError>;
}
