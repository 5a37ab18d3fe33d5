//! UAA（ユーザーディレクトリ）クライアント
//!
//! SCIM の `/Users` `/Groups` とクライアントクレデンシャルの `/oauth/token` を使う。

use async_trait::async_trait;
use itertools::Itertools;
use notifyd_domain::directory::{Identity, UserGuid};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};

use super::{AccessToken, DirectoryError, REQUEST_TIMEOUT, UserDirectory};

/// 1 回の `/Users` フィルタに含める ID の数
const IDS_PER_QUERY: usize = 50;

/// 全ユーザー取得時のページサイズ
const PAGE_SIZE: usize = 100;

/// UAA クライアント
pub struct UaaDirectory {
    client:        reqwest::Client,
    base_url:      String,
    client_id:     String,
    client_secret: String,
}

impl UaaDirectory {
    /// 新しいクライアントを作成
    ///
    /// # 引数
    ///
    /// - `base_url`: UAA のベース URL（例: "https://uaa.example.com"）
    /// - `client_id` / `client_secret`: クライアントクレデンシャル
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Unknown(format!("HTTP クライアントの構築に失敗: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &AccessToken,
    ) -> Result<T, DirectoryError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token.as_str())
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }
        Ok(response.json::<T>().await?)
    }
}

/// UAA の失敗応答を分類する
///
/// ルーターが返す 404（`Requested route ... does not exist`）は UAA 自体に
/// 到達できていないため到達不能として扱う。
fn classify(status: StatusCode, body: &str) -> DirectoryError {
    let detail = format!("UAA が {status} を返しました: {body}");
    if status == StatusCode::NOT_FOUND {
        if body.contains("Requested route") {
            DirectoryError::Unavailable(detail)
        } else {
            DirectoryError::Unknown(detail)
        }
    } else if status.is_server_error() {
        DirectoryError::Unavailable(detail)
    } else {
        DirectoryError::Unknown(detail)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersPage {
    #[serde(default)]
    resources:     Vec<UaaUser>,
    #[serde(default)]
    total_results: usize,
}

#[derive(Deserialize)]
struct UaaUser {
    id:     String,
    #[serde(default)]
    emails: Vec<UaaValue>,
}

#[derive(Deserialize)]
struct GroupsPage {
    #[serde(default)]
    resources: Vec<UaaGroup>,
}

#[derive(Deserialize)]
struct UaaGroup {
    #[serde(default)]
    members: Vec<UaaValue>,
}

#[derive(Deserialize)]
struct UaaValue {
    value: String,
}

impl TryFrom<UaaUser> for Identity {
    type Error = DirectoryError;

    fn try_from(user: UaaUser) -> Result<Self, Self::Error> {
        Ok(Identity {
            guid:   UserGuid::new(user.id).map_err(|e| DirectoryError::Unknown(e.to_string()))?,
            emails: user.emails.into_iter().map(|e| e.value).collect(),
        })
    }
}

#[async_trait]
impl UserDirectory for UaaDirectory {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn client_token(&self) -> Result<AccessToken, DirectoryError> {
        let response = self
            .client
            .post(format!("{}/oauth/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }
        let token: TokenResponse = response.json().await?;
        Ok(AccessToken::new(token.access_token))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(count = guids.len()))]
    async fn users_by_ids(
        &self,
        guids: &[UserGuid],
        token: &AccessToken,
    ) -> Result<Vec<Identity>, DirectoryError> {
        let unique: Vec<&UserGuid> = guids.iter().unique().collect();
        let mut identities = Vec::with_capacity(unique.len());

        for chunk in unique.chunks(IDS_PER_QUERY) {
            let filter = chunk
                .iter()
                .map(|guid| format!("id eq \"{guid}\""))
                .join(" or ");
            let page: UsersPage = self
                .get_json(
                    "/Users",
                    &[("filter", filter), ("count", chunk.len().to_string())],
                    token,
                )
                .await?;

            for user in page.resources {
                identities.push(Identity::try_from(user)?);
            }
        }

        Ok(identities)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(scope = %scope))]
    async fn user_guids_by_scope(
        &self,
        scope: &str,
        token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError> {
        let page: GroupsPage = self
            .get_json(
                "/Groups",
                &[("filter", format!("displayName eq \"{scope}\""))],
                token,
            )
            .await?;

        page.resources
            .into_iter()
            .flat_map(|group| group.members)
            .map(|member| member.value)
            .unique()
            .map(|value| UserGuid::new(value).map_err(|e| DirectoryError::Unknown(e.to_string())))
            .collect()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn all_users(&self, token: &AccessToken) -> Result<Vec<Identity>, DirectoryError> {
        let mut identities = Vec::new();
        let mut start_index = 1;

        loop {
            let page: UsersPage = self
                .get_json(
                    "/Users",
                    &[
                        ("startIndex", start_index.to_string()),
                        ("count", PAGE_SIZE.to_string()),
                    ],
                    token,
                )
                .await?;

            let received = page.resources.len();
            for user in page.resources {
                identities.push(Identity::try_from(user)?);
            }

            if received == 0 || identities.len() >= page.total_results {
                break;
            }
            start_index += received;
        }

        Ok(identities)
    }
}
